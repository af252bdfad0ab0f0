//! Filesystem events to affected entry files

pub mod watcher;

pub use watcher::{FileWatcher, WatchEvent, WatcherService, should_ignore_path};
