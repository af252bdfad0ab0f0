//! Engine error taxonomy

use ripple_core::{CacheError, GraphError, OracleError, SaveError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("resolver worker did not become ready within {0:?}")]
    ReadyTimeout(Duration),
    #[error("resolver worker exited while a resolution was in flight")]
    Crashed,
    #[error("resolver worker was terminated")]
    Terminated,
    #[error("resolver worker is no longer running")]
    Disconnected,
    #[error("resolver worker exited with code {0}")]
    UnexpectedExit(i32),
    #[error("resolver worker panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn resolver worker: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
