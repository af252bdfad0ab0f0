//! Changed files to affected entry files

use ripple_core::DependencyGraph;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Affected {
    /// Changed files plus every file between them and an entry file.
    pub affected_files: BTreeSet<PathBuf>,
    pub affected_entry_files: BTreeSet<PathBuf>,
}

impl Affected {
    pub fn is_empty(&self) -> bool {
        self.affected_files.is_empty() && self.affected_entry_files.is_empty()
    }
}

/// Walk from each changed path towards the entry files that depend on it.
///
/// A changed entry file is affected by definition and is not walked further.
/// Paths unknown to the graph contribute nothing.
pub fn affected_by<'a>(
    graph: &DependencyGraph,
    changed: impl IntoIterator<Item = &'a PathBuf>,
) -> Affected {
    let mut affected = Affected::default();

    for path in changed {
        let key = graph.key(path);
        if !graph.has(&key) {
            continue;
        }
        if graph.is_entry_file(&key) {
            affected.affected_files.insert(key.clone());
            affected.affected_entry_files.insert(key);
            continue;
        }

        let ancestors = graph.ancestors_and_entry_files(&key);
        affected.affected_files.insert(key);
        affected.affected_files.extend(ancestors.ancestors);
        affected.affected_entry_files.extend(ancestors.entry_files);
    }

    affected
}
