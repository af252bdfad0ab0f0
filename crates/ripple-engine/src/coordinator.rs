//! Orchestrates dependency resolution, inline or on the worker thread

use crate::config::EngineConfig;
use crate::error::WorkerError;
use crate::worker::{WireShape, WorkerChannel, WorkerTerminator};
use async_trait::async_trait;
use ripple_resolver::{Resolution, ResolveOptions, Resolver};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolution results keyed by the path that was asked for.
pub type ResolutionMap = BTreeMap<PathBuf, Resolution>;

/// Where resolution runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    #[default]
    Inline,
    Threaded,
}

#[async_trait]
pub trait ResolutionStrategy: Send {
    /// Resolve every path. Paths are processed last queued first.
    async fn resolve_all(&mut self, paths: Vec<PathBuf>) -> Result<ResolutionMap, WorkerError>;

    /// Release any resources. Safe to call more than once.
    async fn terminate(&mut self) -> Result<(), WorkerError>;

    fn name(&self) -> &'static str;
}

/// Calls the resolver on the calling task, one path at a time.
pub struct InlineStrategy {
    resolver: Arc<dyn Resolver>,
    options: ResolveOptions,
}

impl InlineStrategy {
    pub fn new(resolver: Arc<dyn Resolver>, options: ResolveOptions) -> Self {
        InlineStrategy { resolver, options }
    }
}

#[async_trait]
impl ResolutionStrategy for InlineStrategy {
    async fn resolve_all(&mut self, paths: Vec<PathBuf>) -> Result<ResolutionMap, WorkerError> {
        let mut results = ResolutionMap::new();
        let mut stack = paths;
        while let Some(filepath) = stack.pop() {
            if results.contains_key(&filepath) {
                continue;
            }
            let resolution = self.resolver.resolve(&filepath, &self.options);
            results.insert(filepath, resolution);
        }
        Ok(results)
    }

    async fn terminate(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Delegates to one persistent [`WorkerChannel`].
pub struct ThreadedStrategy {
    channel: WorkerChannel,
}

impl ThreadedStrategy {
    pub fn spawn(
        resolver: Arc<dyn Resolver>,
        options: ResolveOptions,
        shape: WireShape,
        ready_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let channel = WorkerChannel::spawn(resolver, options, shape, ready_timeout)?;
        Ok(ThreadedStrategy { channel })
    }

    pub fn terminator(&self) -> WorkerTerminator {
        self.channel.terminator()
    }
}

#[async_trait]
impl ResolutionStrategy for ThreadedStrategy {
    async fn resolve_all(&mut self, paths: Vec<PathBuf>) -> Result<ResolutionMap, WorkerError> {
        self.channel.resolve_all(paths).await
    }

    async fn terminate(&mut self) -> Result<(), WorkerError> {
        self.channel.terminate().await
    }

    fn name(&self) -> &'static str {
        "threaded"
    }
}

/// Entry point hydration uses to turn a frontier into resolutions.
pub struct ResolutionCoordinator {
    strategy: Box<dyn ResolutionStrategy>,
    terminator: Option<WorkerTerminator>,
}

impl std::fmt::Debug for ResolutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCoordinator")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl ResolutionCoordinator {
    pub fn new(strategy: Box<dyn ResolutionStrategy>) -> Self {
        ResolutionCoordinator {
            strategy,
            terminator: None,
        }
    }

    pub fn inline(resolver: Arc<dyn Resolver>, options: ResolveOptions) -> Self {
        Self::new(Box::new(InlineStrategy::new(resolver, options)))
    }

    pub fn threaded(strategy: ThreadedStrategy) -> Self {
        let terminator = strategy.terminator();
        ResolutionCoordinator {
            strategy: Box::new(strategy),
            terminator: Some(terminator),
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, WorkerError> {
        let options = config.resolve_options();
        match config.resolution {
            ResolutionMode::Inline => Ok(Self::inline(resolver, options)),
            ResolutionMode::Threaded => Ok(Self::threaded(ThreadedStrategy::spawn(
                resolver,
                options,
                config.wire_shape,
                config.worker_ready_timeout(),
            )?)),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Handle for stopping a threaded worker; `None` for inline resolution.
    pub fn terminator(&self) -> Option<WorkerTerminator> {
        self.terminator.clone()
    }

    pub async fn resolve_all(&mut self, paths: Vec<PathBuf>) -> Result<ResolutionMap, WorkerError> {
        if paths.is_empty() {
            return Ok(ResolutionMap::new());
        }
        let count = paths.len();
        let results = self.strategy.resolve_all(paths).await?;
        tracing::debug!("Resolved {} files ({})", count, self.strategy.name());
        Ok(results)
    }

    pub async fn terminate(&mut self) -> Result<(), WorkerError> {
        self.strategy.terminate().await
    }
}
