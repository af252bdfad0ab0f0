//! Cache-backed dependency tree with drift recovery

use crate::affected::{Affected, affected_by};
use crate::config::EngineConfig;
use crate::coordinator::ResolutionCoordinator;
use crate::error::EngineError;
use crate::hydrate::{HydrationEngine, HydrationReport};
use ripple_core::{
    ChangeSet, DependencyGraph, FileChangeOracle, NodeUpdate, PruneReport, load_graph, save_graph,
};
use ripple_resolver::Resolver;
use ripple_resolver::paths::probe;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The graph, the oracle and the resolver, kept in step with both caches.
#[derive(Debug)]
pub struct DependencyTree {
    config: EngineConfig,
    graph: DependencyGraph,
    oracle: FileChangeOracle,
    coordinator: ResolutionCoordinator,
}

impl DependencyTree {
    /// Open with the resolution mode from `config`.
    pub async fn open(config: EngineConfig, resolver: Arc<dyn Resolver>) -> Result<Self, EngineError> {
        let coordinator = ResolutionCoordinator::from_config(&config, resolver)?;
        Self::open_with(config, coordinator).await
    }

    /// Load both caches, bring the configured entry files up to date and save.
    pub async fn open_with(
        config: EngineConfig,
        coordinator: ResolutionCoordinator,
    ) -> Result<Self, EngineError> {
        let graph = match load_graph(&config.graph_cache_path(), config.canonicalizer()).await? {
            Some(graph) => graph,
            None => {
                debug!("No graph cache at {}", config.graph_cache_path().display());
                DependencyGraph::new(config.canonicalizer())
            }
        };
        let mut oracle = FileChangeOracle::load(config.fingerprint_cache_path()).await?;

        let orphaned = graph.filter_untracked(oracle.paths()).len();
        if orphaned > 0 {
            warn!(
                "{} fingerprinted files are missing from the graph cache, discarding fingerprint history",
                orphaned
            );
            oracle.reset();
        }

        let mut tree = DependencyTree {
            config,
            graph,
            oracle,
            coordinator,
        };
        let entries = tree.config.entry_paths();
        tree.add_entry_files(entries).await?;
        Ok(tree)
    }

    /// Promote `paths` to entry files and hydrate whatever is new or changed.
    pub async fn add_entry_files(
        &mut self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<HydrationReport, EngineError> {
        let mut fresh = BTreeSet::new();
        let mut absent = BTreeSet::new();
        let mut known = Vec::new();
        for path in paths {
            let key = self.graph.key(&path);
            if !self.graph.is_entry_file(&key) {
                self.graph.upsert(&key, NodeUpdate::entry());
                fresh.insert(key);
            } else if self.graph.is_missing(&key) {
                absent.insert(key);
            } else if self.oracle.is_tracked(&key) {
                known.push(key);
            }
        }

        let changes = if known.is_empty() {
            ChangeSet::default()
        } else {
            self.oracle.changed(Some(known.as_slice()))?
        };
        if !fresh.is_empty() {
            info!("Adding {} entry files", fresh.len());
        }

        let recovered = self.recovered_files();
        let mut forced = changes.changed.clone();
        forced.extend(recovered.iter().cloned());

        let mut seeds = fresh;
        seeds.extend(absent);
        seeds.extend(changes.all());
        seeds.extend(recovered);
        let report = self.hydrate(seeds, &forced).await?;
        self.save().await?;
        Ok(report)
    }

    /// Entry files affected by everything that changed since the last call,
    /// plus `known_changed`. Files importing a missing dependency that has
    /// since appeared are re-resolved and count as changed.
    pub async fn affected(&mut self, known_changed: &[PathBuf]) -> Result<Affected, EngineError> {
        let explicit: BTreeSet<PathBuf> = known_changed.iter().map(|p| self.graph.key(p)).collect();
        for path in &explicit {
            if self.oracle.is_tracked(path) {
                self.oracle.mark_changed(path);
            }
        }

        let changes = self.oracle.changed(None)?;
        let reported = changes.all();
        self.reconcile(&reported).await?;

        let recovered = self.recovered_files();
        let seeds: BTreeSet<PathBuf> = reported
            .iter()
            .chain(explicit.iter())
            .chain(recovered.iter())
            .filter(|p| self.graph.has(p))
            .cloned()
            .collect();
        let mut forced = changes.changed.clone();
        forced.extend(explicit.iter().cloned());
        forced.extend(recovered.iter().cloned());

        if !seeds.is_empty() {
            self.hydrate(seeds, &forced).await?;
        }

        let mut changed = reported;
        changed.extend(explicit);
        changed.extend(recovered);
        let affected = affected_by(&self.graph, &changed);
        info!(
            "{} changed files affect {} entry files",
            changed.len(),
            affected.affected_entry_files.len()
        );

        self.save().await?;
        Ok(affected)
    }

    /// Force the next [`DependencyTree::affected`] to treat `path` as changed.
    pub fn mark_changed(&mut self, path: &Path) {
        let key = self.graph.key(path);
        if self.oracle.is_tracked(&key) {
            self.oracle.mark_changed(&key);
        } else {
            debug!("Ignoring change mark for untracked {}", key.display());
        }
    }

    /// Drop missing nodes nothing depends on and recompute attribution.
    pub async fn prune(&mut self) -> Result<PruneReport, EngineError> {
        let report = self.graph.prune();
        self.graph.refresh_attribution();
        if !report.is_empty() {
            info!("Pruned {} missing files", report.removed.len());
        }
        self.save().await?;
        Ok(report)
    }

    /// Persist both caches. Fingerprints are kept for present nodes only.
    pub async fn save(&mut self) -> Result<(), EngineError> {
        save_graph(&self.graph, &self.config.graph_cache_path()).await?;
        let present = self.graph.present_paths();
        let saved = self.oracle.save(&present).await?;
        debug!("Saved {} fingerprints", saved);
        Ok(())
    }

    /// Replace the in-memory graph with the graph cache on disk.
    pub async fn reload_graph(&mut self) -> Result<(), EngineError> {
        let canonicalizer = self.config.canonicalizer();
        self.graph = load_graph(&self.config.graph_cache_path(), canonicalizer)
            .await?
            .unwrap_or_else(|| DependencyGraph::new(canonicalizer));
        Ok(())
    }

    /// Forget all fingerprint history and rebuild the graph from the entry
    /// files.
    pub async fn rebuild(&mut self) -> Result<HydrationReport, EngineError> {
        let mut entries = self.graph.entry_files();
        entries.extend(self.config.entry_paths().iter().map(|p| self.graph.key(p)));

        self.graph = DependencyGraph::new(self.config.canonicalizer());
        self.oracle.reset();
        for entry in &entries {
            self.graph.upsert(entry, NodeUpdate::entry());
        }
        info!("Rebuilding graph from {} entry files", entries.len());
        self.hydrate(entries.clone(), &entries).await
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn entry_files(&self) -> BTreeSet<PathBuf> {
        self.graph.entry_files()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &ResolutionCoordinator {
        &self.coordinator
    }

    /// Stop the resolver worker, if any.
    pub async fn shutdown(mut self) -> Result<(), EngineError> {
        self.coordinator.terminate().await?;
        Ok(())
    }

    async fn hydrate(
        &mut self,
        seeds: BTreeSet<PathBuf>,
        forced: &BTreeSet<PathBuf>,
    ) -> Result<HydrationReport, EngineError> {
        HydrationEngine::new(&mut self.graph, &mut self.oracle, &mut self.coordinator)
            .hydrate(seeds, forced)
            .await
    }

    /// Make sure every path the oracle reported is a node in the graph.
    async fn reconcile(&mut self, reported: &BTreeSet<PathBuf>) -> Result<(), EngineError> {
        if self.unknown_count(reported) == 0 {
            return Ok(());
        }

        warn!(
            "Fingerprint cache knows {} files missing from the graph, reloading graph cache",
            self.unknown_count(reported)
        );
        self.reload_graph().await?;
        if self.unknown_count(reported) == 0 {
            return Ok(());
        }

        warn!("Graph cache still out of step, rebuilding from entry files");
        self.rebuild().await?;
        let unknown = self.unknown_count(reported);
        if unknown > 0 {
            warn!("{} changed files are unknown to the graph after rebuild", unknown);
        }
        Ok(())
    }

    /// Missing entry files that exist again, and present files importing a
    /// missing dependency that now probes to a file.
    fn recovered_files(&self) -> BTreeSet<PathBuf> {
        let mut recovered = BTreeSet::new();
        for node in self.graph.nodes() {
            if !node.attributes.missing || !node.path.is_absolute() {
                continue;
            }
            if node.attributes.entry_file && node.path.is_file() {
                debug!("Entry file {} reappeared", node.path.display());
                recovered.insert(node.path.clone());
            }
            if let Some(found) = probe(&node.path) {
                debug!("{} now resolves to {}", node.path.display(), found.display());
                recovered.extend(
                    self.graph
                        .dependents_of(&node.path)
                        .into_iter()
                        .filter(|dependent| !self.graph.is_missing(dependent)),
                );
            }
        }
        recovered
    }

    fn unknown_count(&self, reported: &BTreeSet<PathBuf>) -> usize {
        self.graph.filter_untracked(reported).len()
    }
}
