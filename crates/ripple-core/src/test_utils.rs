//! Test utilities for Ripple

use crate::graph::DependencyGraph;
use crate::model::NodeUpdate;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a temporary repository with the given `(relative path, content)` files
pub fn create_test_repo(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (relative, content) in files {
        write_file(temp_dir.path(), relative, content);
    }
    temp_dir
}

/// Write (or overwrite) a file below `root`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn p(path: &str) -> PathBuf {
    PathBuf::from(path)
}

/// The reference scenario: entry A requires D, entry B requires T and D,
/// T requires D.
pub fn scenario_graph() -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/src/A.js"), NodeUpdate::entry());
    graph.upsert(&p("/src/B.js"), NodeUpdate::entry());
    graph.upsert(&p("/src/D.js"), NodeUpdate::dependency_of("/src/A.js"));
    graph.upsert(&p("/src/D.js"), NodeUpdate::dependency_of("/src/B.js"));
    graph.upsert(&p("/src/D.js"), NodeUpdate::dependency_of("/src/T.js"));
    graph.upsert(&p("/src/T.js"), NodeUpdate::dependency_of("/src/B.js"));
    graph
}
