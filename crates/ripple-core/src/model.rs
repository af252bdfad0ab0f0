//! Core data structures for the dependency graph

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Attributes carried by every tracked file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAttributes {
    /// Referenced by some file but absent on disk.
    #[serde(default)]
    pub missing: bool,
    /// Caller-designated root.
    #[serde(default)]
    pub entry_file: bool,
    /// Entry files known to depend on this node, maintained during hydration.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub entry_files: BTreeSet<PathBuf>,
}

/// A single node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub path: PathBuf,
    pub attributes: NodeAttributes,
}

impl ModuleNode {
    pub fn new(path: PathBuf) -> Self {
        ModuleNode {
            path,
            attributes: NodeAttributes::default(),
        }
    }
}

/// Merge-insert request for [`crate::DependencyGraph::upsert`].
///
/// `missing` is left untouched when `None`. `entry_file` only ever promotes a
/// node; passing `false` never clears an existing flag.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub dependents: BTreeSet<PathBuf>,
    pub missing: Option<bool>,
    pub entry_file: bool,
}

impl NodeUpdate {
    pub fn entry() -> Self {
        NodeUpdate {
            entry_file: true,
            ..Default::default()
        }
    }

    pub fn missing() -> Self {
        NodeUpdate {
            missing: Some(true),
            ..Default::default()
        }
    }

    pub fn dependency_of(dependent: impl Into<PathBuf>) -> Self {
        NodeUpdate {
            dependents: BTreeSet::from([dependent.into()]),
            ..Default::default()
        }
    }

    pub fn with_missing(mut self, missing: bool) -> Self {
        self.missing = Some(missing);
        self
    }
}

/// Result of an ancestor walk from a changed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorSet {
    /// Every node on some dependency chain to an entry file, excluding the start.
    pub ancestors: BTreeSet<PathBuf>,
    pub entry_files: BTreeSet<PathBuf>,
}

/// What a prune or removal took out of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: BTreeSet<PathBuf>,
    /// Surviving nodes that lost at least one edge.
    pub affected: BTreeSet<PathBuf>,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// On-disk node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub key: PathBuf,
    #[serde(default)]
    pub attributes: NodeAttributes,
}

/// On-disk edge record: `source` is a dependency of `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Graph-level options written alongside the node and edge lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphOptions {
    #[serde(rename = "type")]
    pub kind: String,
    pub multi: bool,
    pub allow_self_loops: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        GraphOptions {
            kind: "directed".to_string(),
            multi: false,
            allow_self_loops: true,
        }
    }
}

/// Serialized form of the whole graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeEntry>,
    pub edges: Vec<EdgeEntry>,
    #[serde(default)]
    pub options: GraphOptions,
}
