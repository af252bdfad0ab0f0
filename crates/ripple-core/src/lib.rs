//! Ripple Core — dependency graph model, fingerprint oracle and caches

pub mod cache;
pub mod canonical;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod model;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use canonical::{CanonicalMode, Canonicalizer};
pub use error::{CacheError, GraphError, OracleError, SaveError};
pub use fingerprint::{ChangeSet, FileChangeOracle, Fingerprint, FingerprintDocument};
pub use graph::DependencyGraph;
pub use model::{
    AncestorSet, EdgeEntry, GraphDocument, GraphOptions, ModuleNode, NodeAttributes, NodeEntry,
    NodeUpdate, PruneReport,
};
pub use cache::{
    CACHE_DIR, FINGERPRINT_CACHE, GRAPH_CACHE, cache_dir, clear_cache, load_fingerprints,
    load_graph, save_fingerprints, save_graph,
};
