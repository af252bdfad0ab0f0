//! Dependency graph store using petgraph::StableDiGraph keyed by file path
//!
//! An edge `D -> P` means file `P` structurally references file `D`, so a
//! node's dependencies are its incoming neighbours and its dependents are its
//! outgoing neighbours.

use crate::canonical::Canonicalizer;
use crate::error::GraphError;
use crate::model::*;
use petgraph::Direction;
use petgraph::algo::all_simple_paths;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// The dependency graph. Paths are the only handle callers ever see.
pub struct DependencyGraph {
    inner: StableDiGraph<ModuleNode, ()>,
    index: HashMap<PathBuf, NodeIndex>,
    canonicalizer: Canonicalizer,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .field("canonicalizer", &self.canonicalizer.mode())
            .finish()
    }
}

impl DependencyGraph {
    pub fn new(canonicalizer: Canonicalizer) -> Self {
        DependencyGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            canonicalizer,
        }
    }

    /// The key a path is stored under.
    pub fn key(&self, path: &Path) -> PathBuf {
        self.canonicalizer.canonical_or_input(path)
    }

    fn lookup(&self, path: &Path) -> Option<NodeIndex> {
        self.index.get(&self.key(path)).copied()
    }

    fn ensure_node(&mut self, key: PathBuf) -> NodeIndex {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.inner.add_node(ModuleNode::new(key.clone()));
        self.index.insert(key, idx);
        idx
    }

    fn add_edge_once(&mut self, source: NodeIndex, target: NodeIndex) -> bool {
        if self.inner.find_edge(source, target).is_some() {
            return false;
        }
        self.inner.add_edge(source, target, ());
        true
    }

    fn path_of(&self, idx: NodeIndex) -> &Path {
        &self.inner[idx].path
    }

    /// Merge `update` into the node for `path`, creating it if needed.
    ///
    /// Adds an edge from `path` to every dependent. Returns the canonical key.
    pub fn upsert(&mut self, path: &Path, update: NodeUpdate) -> PathBuf {
        let key = self.key(path);
        let idx = self.ensure_node(key.clone());

        let attributes = &mut self.inner[idx].attributes;
        if let Some(missing) = update.missing {
            attributes.missing = missing;
        }
        if update.entry_file {
            attributes.entry_file = true;
        }

        for dependent in update.dependents {
            let dependent_key = self.key(&dependent);
            let dependent_idx = self.ensure_node(dependent_key);
            self.add_edge_once(idx, dependent_idx);
        }

        key
    }

    /// Replace the whole dependency set of `path`.
    ///
    /// Dependencies absent from `resolved` and `missing` lose their edge to
    /// `path` and are returned. Missing dependencies never keep dependencies
    /// of their own.
    pub fn replace_dependencies(
        &mut self,
        path: &Path,
        resolved: &BTreeSet<PathBuf>,
        missing: &BTreeSet<PathBuf>,
    ) -> BTreeSet<PathBuf> {
        let key = self.key(path);
        let idx = self.ensure_node(key.clone());

        let wanted: HashSet<PathBuf> = resolved
            .iter()
            .chain(missing.iter())
            .map(|p| self.key(p))
            .collect();

        let stale: Vec<_> = self
            .inner
            .edges_directed(idx, Direction::Incoming)
            .filter(|edge| !wanted.contains(self.path_of(edge.source())))
            .map(|edge| (edge.id(), edge.source()))
            .collect();

        let mut dropped = BTreeSet::new();
        for (edge, source) in stale {
            dropped.insert(self.path_of(source).to_path_buf());
            self.inner.remove_edge(edge);
        }

        for dependency in resolved {
            self.upsert(dependency, NodeUpdate::dependency_of(key.clone()).with_missing(false));
        }
        for dependency in missing {
            let missing_key =
                self.upsert(dependency, NodeUpdate::dependency_of(key.clone()).with_missing(true));
            if missing_key != key {
                self.clear_dependencies(&missing_key);
            }
        }

        dropped
    }

    /// Drop every dependency edge of `path`. Returns the former dependencies.
    pub fn clear_dependencies(&mut self, path: &Path) -> BTreeSet<PathBuf> {
        match self.lookup(path) {
            Some(_) => self.replace_dependencies(path, &BTreeSet::new(), &BTreeSet::new()),
            None => BTreeSet::new(),
        }
    }

    pub fn has(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    pub fn is_missing(&self, path: &Path) -> bool {
        self.lookup(path)
            .is_some_and(|idx| self.inner[idx].attributes.missing)
    }

    pub fn is_entry_file(&self, path: &Path) -> bool {
        self.lookup(path)
            .is_some_and(|idx| self.inner[idx].attributes.entry_file)
    }

    /// Attributes of a node, if present.
    pub fn attributes(&self, path: &Path) -> Option<&NodeAttributes> {
        self.lookup(path).map(|idx| &self.inner[idx].attributes)
    }

    fn set_missing(&mut self, path: &Path, missing: bool) -> Result<(), GraphError> {
        let idx = self
            .lookup(path)
            .ok_or_else(|| GraphError::NotFound(self.key(path)))?;
        self.inner[idx].attributes.missing = missing;
        Ok(())
    }

    pub fn mark_missing(&mut self, path: &Path) -> Result<(), GraphError> {
        self.set_missing(path, true)
    }

    pub fn mark_found(&mut self, path: &Path) -> Result<(), GraphError> {
        self.set_missing(path, false)
    }

    /// Files `path` depends on.
    pub fn dependencies_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.neighbours(path, Direction::Incoming)
    }

    /// Files that depend on `path`.
    pub fn dependents_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.neighbours(path, Direction::Outgoing)
    }

    fn neighbours(&self, path: &Path, direction: Direction) -> BTreeSet<PathBuf> {
        let Some(idx) = self.lookup(path) else {
            return BTreeSet::new();
        };
        self.inner
            .neighbors_directed(idx, direction)
            .map(|n| self.path_of(n).to_path_buf())
            .collect()
    }

    /// Entry files recorded as depending on `path`.
    pub fn attribution(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.attributes(path)
            .map(|a| a.entry_files.clone())
            .unwrap_or_default()
    }

    /// Attribution a node passes to its dependencies: its own attribution plus
    /// itself when it is an entry file.
    pub fn provenance(&self, path: &Path) -> BTreeSet<PathBuf> {
        let Some(idx) = self.lookup(path) else {
            return BTreeSet::new();
        };
        let node = &self.inner[idx];
        let mut provenance = node.attributes.entry_files.clone();
        if node.attributes.entry_file {
            provenance.insert(node.path.clone());
        }
        provenance
    }

    /// Union `entry_files` into the attribution of `path`. Returns true if it grew.
    pub fn attribute(&mut self, path: &Path, entry_files: &BTreeSet<PathBuf>) -> bool {
        let Some(idx) = self.lookup(path) else {
            return false;
        };
        let attribution = &mut self.inner[idx].attributes.entry_files;
        let before = attribution.len();
        attribution.extend(entry_files.iter().cloned());
        attribution.len() != before
    }

    /// Recompute every attribution set from the current edges.
    pub fn refresh_attribution(&mut self) {
        let indices: Vec<NodeIndex> = self.inner.node_indices().collect();
        for &idx in &indices {
            self.inner[idx].attributes.entry_files.clear();
        }

        let entries: Vec<NodeIndex> = indices
            .iter()
            .copied()
            .filter(|&idx| self.inner[idx].attributes.entry_file)
            .collect();

        for entry in entries {
            let entry_path = self.path_of(entry).to_path_buf();
            let mut visited = HashSet::from([entry]);
            let mut queue = VecDeque::from([entry]);
            while let Some(current) = queue.pop_front() {
                let dependencies: Vec<NodeIndex> = self
                    .inner
                    .neighbors_directed(current, Direction::Incoming)
                    .collect();
                for dependency in dependencies {
                    if visited.insert(dependency) {
                        self.inner[dependency]
                            .attributes
                            .entry_files
                            .insert(entry_path.clone());
                        queue.push_back(dependency);
                    }
                }
            }
        }
    }

    fn reachable_entries(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut entries = Vec::new();

        while let Some(current) = queue.pop_front() {
            if self.inner[current].attributes.entry_file {
                entries.push(current);
            }
            for next in self.inner.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        entries
    }

    /// Every entry file reachable from `path` along dependency edges.
    pub fn entry_files_reachable_from(&self, path: &Path) -> BTreeSet<PathBuf> {
        let Some(start) = self.lookup(path) else {
            return BTreeSet::new();
        };
        self.reachable_entries(start)
            .into_iter()
            .map(|idx| self.path_of(idx).to_path_buf())
            .collect()
    }

    /// Every node lying on some simple path from `path` to a reachable entry
    /// file, together with those entry files.
    pub fn ancestors_and_entry_files(&self, path: &Path) -> AncestorSet {
        let Some(start) = self.lookup(path) else {
            return AncestorSet::default();
        };

        let mut result = AncestorSet::default();
        for entry in self.reachable_entries(start) {
            result.entry_files.insert(self.path_of(entry).to_path_buf());
            if entry == start {
                continue;
            }
            for route in all_simple_paths::<Vec<NodeIndex>, _>(&self.inner, start, entry, 0, None) {
                for idx in route.into_iter().skip(1) {
                    result.ancestors.insert(self.path_of(idx).to_path_buf());
                }
            }
        }

        result
    }

    /// Paths from `paths` that are not nodes in the graph.
    pub fn filter_untracked<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a PathBuf>,
    ) -> BTreeSet<PathBuf> {
        paths
            .into_iter()
            .map(|p| self.key(p))
            .filter(|key| !self.index.contains_key(key))
            .collect()
    }

    /// Remove missing nodes nothing depends on any more, cascading. Missing
    /// entry files stay.
    pub fn prune(&mut self) -> PruneReport {
        let orphans: Vec<NodeIndex> = self
            .inner
            .node_indices()
            .filter(|&idx| self.is_orphaned_missing(idx))
            .collect();
        let report = self.remove_cascade(orphans);
        if !report.is_empty() {
            tracing::debug!(
                "Pruned {} missing nodes, {} nodes lost edges",
                report.removed.len(),
                report.affected.len()
            );
        }
        report
    }

    /// Remove `path` and any missing dependency it leaves orphaned.
    pub fn remove(&mut self, path: &Path) -> Result<PruneReport, GraphError> {
        let idx = self
            .lookup(path)
            .ok_or_else(|| GraphError::NotFound(self.key(path)))?;
        Ok(self.remove_cascade(vec![idx]))
    }

    fn is_orphaned_missing(&self, idx: NodeIndex) -> bool {
        let attributes = &self.inner[idx].attributes;
        attributes.missing
            && !attributes.entry_file
            && self
                .inner
                .neighbors_directed(idx, Direction::Outgoing)
                .next()
                .is_none()
    }

    fn remove_cascade(&mut self, mut queue: Vec<NodeIndex>) -> PruneReport {
        let mut report = PruneReport::default();

        while let Some(idx) = queue.pop() {
            if self.inner.node_weight(idx).is_none() {
                continue;
            }
            let dependencies: Vec<NodeIndex> = self
                .inner
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|&n| n != idx)
                .collect();
            let dependents: Vec<NodeIndex> = self
                .inner
                .neighbors_directed(idx, Direction::Outgoing)
                .filter(|&n| n != idx)
                .collect();

            let Some(node) = self.inner.remove_node(idx) else {
                continue;
            };
            self.index.remove(&node.path);
            report.removed.insert(node.path);

            for &n in dependencies.iter().chain(dependents.iter()) {
                report.affected.insert(self.path_of(n).to_path_buf());
            }
            for dependency in dependencies {
                if self.is_orphaned_missing(dependency) {
                    queue.push(dependency);
                }
            }
        }

        report.affected.retain(|p| !report.removed.contains(p));
        report
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Every node flagged as an entry file.
    pub fn entry_files(&self) -> BTreeSet<PathBuf> {
        self.nodes()
            .filter(|n| n.attributes.entry_file)
            .map(|n| n.path.clone())
            .collect()
    }

    /// Nodes that are expected to exist on disk.
    pub fn present_paths(&self) -> BTreeSet<PathBuf> {
        self.nodes()
            .filter(|n| !n.attributes.missing)
            .map(|n| n.path.clone())
            .collect()
    }

    /// Stable, sorted serialized form.
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<NodeEntry> = self
            .nodes()
            .map(|n| NodeEntry {
                key: n.path.clone(),
                attributes: n.attributes.clone(),
            })
            .collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));

        let mut edges: Vec<EdgeEntry> = self
            .inner
            .edge_indices()
            .filter_map(|e| self.inner.edge_endpoints(e))
            .map(|(source, target)| EdgeEntry {
                source: self.path_of(source).to_path_buf(),
                target: self.path_of(target).to_path_buf(),
            })
            .collect();
        edges.sort();

        GraphDocument {
            nodes,
            edges,
            options: GraphOptions::default(),
        }
    }

    /// Rebuild a graph from its serialized form. Keys are taken verbatim.
    pub fn from_document(document: GraphDocument, canonicalizer: Canonicalizer) -> Self {
        let mut graph = DependencyGraph::new(canonicalizer);
        for entry in document.nodes {
            let idx = graph.ensure_node(entry.key);
            graph.inner[idx].attributes = entry.attributes;
        }
        for edge in document.edges {
            let source = graph.ensure_node(edge.source);
            let target = graph.ensure_node(edge.target);
            graph.add_edge_once(source, target);
        }
        graph
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new(Canonicalizer::default())
    }
}
