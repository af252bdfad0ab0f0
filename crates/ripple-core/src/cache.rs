//! On-disk caches for the graph and the fingerprint snapshot

use crate::canonical::Canonicalizer;
use crate::error::CacheError;
use crate::fingerprint::FingerprintDocument;
use crate::graph::DependencyGraph;
use crate::model::GraphDocument;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Cache directory: .ripple/
pub const CACHE_DIR: &str = ".ripple";

/// Graph cache file
pub const GRAPH_CACHE: &str = "graph.json";

/// Fingerprint cache file
pub const FINGERPRINT_CACHE: &str = "fingerprints.json";

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Ensure the directory holding `file` exists
pub async fn ensure_parent_dir(file: &Path) -> Result<(), CacheError> {
    let Some(parent) = file.parent() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|source| CacheError::Io {
            path: parent.to_path_buf(),
            source,
        })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), CacheError> {
    ensure_parent_dir(path).await?;
    let json_str = serde_json::to_string_pretty(value).map_err(|source| CacheError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, json_str)
        .await
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize the whole graph to `path`.
pub async fn save_graph(graph: &DependencyGraph, path: &Path) -> Result<(), CacheError> {
    write_json(&graph.to_document(), path).await?;
    tracing::debug!(
        "Graph cache saved: {} ({} nodes, {} edges)",
        path.display(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}

/// Load a graph from `path`. `Ok(None)` when no cache exists yet; malformed
/// JSON is an error.
pub async fn load_graph(
    path: &Path,
    canonicalizer: Canonicalizer,
) -> Result<Option<DependencyGraph>, CacheError> {
    let Some(document) = read_json::<GraphDocument>(path).await? else {
        return Ok(None);
    };
    let graph = DependencyGraph::from_document(document, canonicalizer);
    tracing::debug!(
        "Graph cache loaded from {} ({} nodes)",
        path.display(),
        graph.node_count()
    );
    Ok(Some(graph))
}

pub async fn save_fingerprints(
    document: &FingerprintDocument,
    path: &Path,
) -> Result<(), CacheError> {
    write_json(document, path).await
}

pub async fn load_fingerprints(path: &Path) -> Result<Option<FingerprintDocument>, CacheError> {
    read_json(path).await
}

/// Clear cache directory
pub async fn clear_cache(dir: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Io {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
