//! Filesystem watcher implementation

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ripple_core::CACHE_DIR;
use ripple_engine::{Affected, DependencyTree};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Events emitted by the file watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// File or directory created
    Created(PathBuf),
    /// File or directory modified
    Modified(PathBuf),
    /// File or directory removed
    Removed(PathBuf),
    /// Ends the current batch without waiting for the debounce window
    ChangesFlushed,
}

/// File system watcher for monitoring source changes
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    watched_paths: HashSet<PathBuf>,
    root_path: PathBuf,
}

impl FileWatcher {
    /// Create a new file watcher for the given root path
    pub fn new(root_path: impl AsRef<Path>, ignore: Arc<GlobSet>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let event_tx_clone = event_tx.clone();
        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    debug!("File system event: {:?}", event);
                    Self::handle_notify_event(event, &event_tx_clone, &ignore);
                }
                Err(e) => {
                    error!("File system watch error: {}", e);
                }
            }
        })?;

        Ok(Self {
            watcher,
            event_tx,
            event_rx,
            watched_paths: HashSet::new(),
            root_path,
        })
    }

    /// Handle a notify event and convert to our watch events
    fn handle_notify_event(
        event: notify::Event,
        event_tx: &mpsc::UnboundedSender<WatchEvent>,
        ignore: &GlobSet,
    ) {
        let wrap: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) => WatchEvent::Created,
            notify::EventKind::Modify(_) => WatchEvent::Modified,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if should_ignore_path(&path, ignore) {
                continue;
            }
            if let Err(e) = event_tx.send(wrap(path)) {
                warn!("Failed to send watch event: {}", e);
            }
        }
    }

    /// Watch a directory recursively
    pub fn watch_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Watching directory: {:?}", path);

        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Stopping watch for: {:?}", path);

        self.watcher.unwatch(path)?;
        self.watched_paths.remove(path);
        Ok(())
    }

    /// Get the event receiver
    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }

    /// A sender feeding the same queue as the filesystem
    pub fn event_sender(&self) -> mpsc::UnboundedSender<WatchEvent> {
        self.event_tx.clone()
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }
}

/// Turns debounced batches of filesystem events into affected-file answers
pub struct WatcherService {
    watcher: FileWatcher,
    tree: DependencyTree,
    debounce: Duration,
    affected_tx: Option<broadcast::Sender<Affected>>,
}

impl WatcherService {
    /// Create a watcher over the tree's project root
    pub fn new(tree: DependencyTree) -> Result<Self> {
        let root = tree.config().cwd.clone();
        let ignore = Arc::new(ignore_set(&tree.config().resolve_options().ignore_globs));
        Ok(Self {
            watcher: FileWatcher::new(root, ignore)?,
            tree,
            debounce: DEFAULT_DEBOUNCE,
            affected_tx: None,
        })
    }

    /// Create a watcher that also publishes every flushed batch
    pub fn with_broadcast(tree: DependencyTree, affected_tx: broadcast::Sender<Affected>) -> Result<Self> {
        let mut service = Self::new(tree)?;
        service.affected_tx = Some(affected_tx);
        Ok(service)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching the project directory
    pub fn start_watching(&mut self) -> Result<()> {
        let root_path = self.watcher.root_path().to_path_buf();
        self.watcher.watch_directory(&root_path)?;
        info!("Started watching project directory: {:?}", root_path);
        Ok(())
    }

    pub fn event_sender(&self) -> mpsc::UnboundedSender<WatchEvent> {
        self.watcher.event_sender()
    }

    pub fn tree(&self) -> &DependencyTree {
        &self.tree
    }

    pub fn into_tree(self) -> DependencyTree {
        self.tree
    }

    /// Wait for the next batch of changed paths.
    ///
    /// A batch ends once no event arrives for the debounce window, or on
    /// [`WatchEvent::ChangesFlushed`]. `None` once the event channel closes.
    pub async fn next_batch(&mut self) -> Option<BTreeSet<PathBuf>> {
        let debounce = self.debounce;
        let event_rx = self.watcher.event_receiver();

        let mut batch = BTreeSet::new();
        let mut next = event_rx.recv().await?;
        loop {
            match next {
                WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => {
                    batch.insert(path);
                }
                WatchEvent::ChangesFlushed => break,
            }
            next = match tokio::time::timeout(debounce, event_rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) | Err(_) => break,
            };
        }
        Some(batch)
    }

    /// Mark `paths` changed and query the tree.
    pub async fn flush(&mut self, paths: BTreeSet<PathBuf>) -> Result<Affected> {
        let mut reappeared = Vec::new();
        for path in &paths {
            if self.tree.graph().is_missing(path) {
                reappeared.push(path.clone());
            } else {
                self.tree.mark_changed(path);
            }
        }

        let affected = self.tree.affected(&reappeared).await?;
        info!(
            "{} changed paths affect {} entry files",
            paths.len(),
            affected.affected_entry_files.len()
        );
        if let Some(ref affected_tx) = self.affected_tx {
            // No receivers is fine
            let _ = affected_tx.send(affected.clone());
        }
        Ok(affected)
    }

    /// Process batches until the event channel closes
    pub async fn process_events(&mut self, mut on_flush: impl FnMut(&Affected)) -> Result<()> {
        while let Some(batch) = self.next_batch().await {
            if batch.is_empty() {
                continue;
            }
            debug!("Processing batch of {} paths", batch.len());
            match self.flush(batch).await {
                Ok(affected) => on_flush(&affected),
                Err(e) => error!("Failed to update dependency tree: {:#}", e),
            }
        }
        Ok(())
    }
}

fn ignore_set(globs: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in globs {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("Ignoring invalid glob {}: {}", pattern, e),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!("Failed to build ignore globs: {}", e);
        GlobSet::empty()
    })
}

/// Check if a path should be ignored (e.g., .git/, node_modules/, the cache)
pub fn should_ignore_path(path: &Path, ignore: &GlobSet) -> bool {
    for component in path.components() {
        if let Some(name) = component.as_os_str().to_str() {
            if name == ".git" || name == "node_modules" || name == CACHE_DIR {
                return true;
            }
        }
    }
    ignore.is_match(path)
}
