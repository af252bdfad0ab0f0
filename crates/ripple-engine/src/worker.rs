//! Dedicated resolver thread and its typed request/response protocol
//!
//! The resolver runs on its own OS thread so a slow or panicking resolver
//! never blocks or takes down the control task. Commands travel over a
//! std channel (the worker blocks on it), events come back over a tokio
//! channel (the control task awaits them).

use crate::error::WorkerError;
use ripple_resolver::{Resolution, ResolveOptions, Resolver};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Exit code of a worker that stopped on `Disconnect`.
pub const EXIT_CLEAN: i32 = 0;
/// Exit code of a worker whose command channel closed without `Disconnect`.
pub const EXIT_ABANDONED: i32 = 1;

/// Control task to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerCommand {
    Ready,
    FindDependencies { filepath: PathBuf },
    Disconnect,
}

/// Worker to control task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerEvent {
    Ready,
    Dependency {
        filepath: PathBuf,
        resolved: PathBuf,
    },
    MissingDependency {
        filepath: PathBuf,
        specifier: String,
    },
    ResolveComplete {
        filepath: PathBuf,
    },
    ResolvedDependencies {
        filepath: PathBuf,
        resolved: BTreeSet<PathBuf>,
        missing: BTreeSet<String>,
    },
}

/// How the worker reports one file's dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireShape {
    /// One event per dependency, then `ResolveComplete`.
    #[default]
    Streaming,
    /// A single `ResolvedDependencies` event.
    Batched,
}

/// Folds worker events into per-file resolutions.
#[derive(Debug, Default)]
pub struct EventAggregator {
    partial: BTreeMap<PathBuf, Resolution>,
    complete: BTreeSet<PathBuf>,
}

impl EventAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns the filepath the event completed, if any.
    pub fn apply(&mut self, event: WorkerEvent) -> Option<PathBuf> {
        match event {
            WorkerEvent::Ready => None,
            WorkerEvent::Dependency { filepath, resolved } => {
                self.partial.entry(filepath).or_default().resolved.insert(resolved);
                None
            }
            WorkerEvent::MissingDependency {
                filepath,
                specifier,
            } => {
                self.partial.entry(filepath).or_default().missing.insert(specifier);
                None
            }
            WorkerEvent::ResolveComplete { filepath } => {
                self.partial.entry(filepath.clone()).or_default();
                self.complete.insert(filepath.clone());
                Some(filepath)
            }
            WorkerEvent::ResolvedDependencies {
                filepath,
                resolved,
                missing,
            } => {
                self.partial
                    .entry(filepath.clone())
                    .or_default()
                    .merge(Resolution { resolved, missing });
                self.complete.insert(filepath.clone());
                Some(filepath)
            }
        }
    }

    pub fn is_complete(&self, filepath: &Path) -> bool {
        self.complete.contains(filepath)
    }

    /// Completed resolutions. Partial results for files that never
    /// completed are dropped.
    pub fn finish(self) -> BTreeMap<PathBuf, Resolution> {
        let complete = self.complete;
        self.partial
            .into_iter()
            .filter(|(path, _)| complete.contains(path))
            .collect()
    }
}

/// Stops a worker from outside the task that owns its channel.
#[derive(Debug, Clone)]
pub struct WorkerTerminator {
    shutdown: Arc<watch::Sender<bool>>,
}

impl WorkerTerminator {
    /// Reject any in-flight work with [`WorkerError::Terminated`].
    pub fn terminate(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Spawned,
    Ready,
    Stopped,
}

/// The control side of one resolver thread.
pub struct WorkerChannel {
    commands: Option<std_mpsc::Sender<WorkerCommand>>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    handle: Option<JoinHandle<i32>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    state: State,
    ready_timeout: Duration,
}

impl std::fmt::Debug for WorkerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerChannel")
            .field("state", &self.state)
            .field("ready_timeout", &self.ready_timeout)
            .finish()
    }
}

impl WorkerChannel {
    /// Start the worker thread. The handshake happens on first use.
    pub fn spawn(
        resolver: Arc<dyn Resolver>,
        options: ResolveOptions,
        shape: WireShape,
        ready_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let (command_tx, command_rx) = std_mpsc::channel::<WorkerCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<WorkerEvent>();

        let handle = std::thread::Builder::new()
            .name("ripple-resolver".to_string())
            .spawn(move || worker_loop(resolver, options, shape, command_rx, event_tx))
            .map_err(WorkerError::Spawn)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        debug!("Resolver worker spawned ({:?} wire shape)", shape);

        Ok(WorkerChannel {
            commands: Some(command_tx),
            events: event_rx,
            handle: Some(handle),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            state: State::Spawned,
            ready_timeout,
        })
    }

    pub fn terminator(&self) -> WorkerTerminator {
        WorkerTerminator {
            shutdown: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// Complete the handshake. Resolved once; later calls return immediately.
    pub async fn ready(&mut self) -> Result<(), WorkerError> {
        match self.state {
            State::Ready => return Ok(()),
            State::Stopped => return Err(WorkerError::Disconnected),
            State::Spawned => {}
        }

        self.send(WorkerCommand::Ready)?;
        match tokio::time::timeout(self.ready_timeout, self.wait_ready()).await {
            Ok(Ok(())) => {
                self.state = State::Ready;
                info!("Resolver worker ready");
                Ok(())
            }
            Ok(Err(e)) => {
                self.abandon();
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Resolver worker not ready after {:?}, detaching it",
                    self.ready_timeout
                );
                self.abandon();
                Err(WorkerError::ReadyTimeout(self.ready_timeout))
            }
        }
    }

    /// Resolve every path, one round-trip at a time, last queued first.
    pub async fn resolve_all(
        &mut self,
        paths: Vec<PathBuf>,
    ) -> Result<BTreeMap<PathBuf, Resolution>, WorkerError> {
        self.ready().await?;

        let mut aggregator = EventAggregator::new();
        let mut stack = paths;
        while let Some(filepath) = stack.pop() {
            if aggregator.is_complete(&filepath) {
                continue;
            }
            self.send(WorkerCommand::FindDependencies {
                filepath: filepath.clone(),
            })?;
            while !aggregator.is_complete(&filepath) {
                let event = match self.next_event().await {
                    Ok(event) => event,
                    Err(e) => {
                        self.abandon();
                        return Err(e);
                    }
                };
                if let Some(done) = aggregator.apply(event) {
                    debug!("Worker resolved {}", done.display());
                }
            }
        }

        Ok(aggregator.finish())
    }

    /// Send `Disconnect` and join the thread.
    pub async fn terminate(&mut self) -> Result<(), WorkerError> {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(WorkerCommand::Disconnect);
        }
        self.state = State::Stopped;
        self.shutdown_tx.send_replace(true);

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let joined = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| WorkerError::Panicked(e.to_string()))?;

        match joined {
            Ok(EXIT_CLEAN) => {
                debug!("Resolver worker exited cleanly");
                Ok(())
            }
            Ok(code) => Err(WorkerError::UnexpectedExit(code)),
            Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn send(&self, command: WorkerCommand) -> Result<(), WorkerError> {
        let commands = self.commands.as_ref().ok_or(WorkerError::Disconnected)?;
        commands.send(command).map_err(|_| WorkerError::Crashed)
    }

    async fn wait_ready(&mut self) -> Result<(), WorkerError> {
        loop {
            match self.next_event().await? {
                WorkerEvent::Ready => return Ok(()),
                other => debug!("Ignoring event before handshake: {:?}", other),
            }
        }
    }

    async fn next_event(&mut self) -> Result<WorkerEvent, WorkerError> {
        if *self.shutdown_rx.borrow() {
            return Err(WorkerError::Terminated);
        }
        tokio::select! {
            event = self.events.recv() => event.ok_or(WorkerError::Crashed),
            _ = self.shutdown_rx.changed() => Err(WorkerError::Terminated),
        }
    }

    /// Drop the command sender and detach the thread.
    fn abandon(&mut self) {
        self.commands = None;
        self.handle = None;
        self.state = State::Stopped;
        self.shutdown_tx.send_replace(true);
    }
}

fn worker_loop(
    resolver: Arc<dyn Resolver>,
    options: ResolveOptions,
    shape: WireShape,
    commands: std_mpsc::Receiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> i32 {
    resolver.prepare();

    loop {
        let command = match commands.recv() {
            Ok(command) => command,
            Err(_) => {
                debug!("Command channel closed, resolver worker exiting");
                return EXIT_ABANDONED;
            }
        };

        let delivered = match command {
            WorkerCommand::Ready => events.send(WorkerEvent::Ready).is_ok(),
            WorkerCommand::FindDependencies { filepath } => {
                find_dependencies(resolver.as_ref(), &options, shape, filepath, &events)
            }
            WorkerCommand::Disconnect => return EXIT_CLEAN,
        };

        if !delivered {
            debug!("Event channel closed, resolver worker exiting");
            return EXIT_ABANDONED;
        }
    }
}

fn find_dependencies(
    resolver: &dyn Resolver,
    options: &ResolveOptions,
    shape: WireShape,
    filepath: PathBuf,
    events: &mpsc::UnboundedSender<WorkerEvent>,
) -> bool {
    match shape {
        WireShape::Streaming => {
            let mut delivered = true;
            let resolution = resolver.resolve_streaming(&filepath, options, &mut |dependency| {
                delivered &= events
                    .send(WorkerEvent::Dependency {
                        filepath: filepath.clone(),
                        resolved: dependency.to_path_buf(),
                    })
                    .is_ok();
            });
            for specifier in resolution.missing {
                delivered &= events
                    .send(WorkerEvent::MissingDependency {
                        filepath: filepath.clone(),
                        specifier,
                    })
                    .is_ok();
            }
            delivered && events.send(WorkerEvent::ResolveComplete { filepath }).is_ok()
        }
        WireShape::Batched => {
            let resolution = resolver.resolve(&filepath, options);
            events
                .send(WorkerEvent::ResolvedDependencies {
                    filepath,
                    resolved: resolution.resolved,
                    missing: resolution.missing,
                })
                .is_ok()
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
