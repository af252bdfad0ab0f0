//! Error types for the graph store, fingerprint oracle and caches

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no node for {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Error)]
pub enum OracleError {
    /// Changed-state was requested for a path the oracle never saw.
    #[error("path is not tracked by the fingerprint cache: {0}")]
    Untracked(PathBuf),
    #[error("failed to fingerprint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode cache for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure while persisting the fingerprint oracle.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}
