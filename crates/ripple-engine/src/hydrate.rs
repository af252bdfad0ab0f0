//! Incremental graph hydration
//!
//! Starting from a set of seeds, files are re-resolved only when they are
//! forced, newly seen, or reported changed by the oracle. Unchanged files keep
//! their recorded dependencies and are walked through so attribution still
//! reaches everything below them.

use crate::coordinator::ResolutionCoordinator;
use crate::error::EngineError;
use ripple_core::{DependencyGraph, FileChangeOracle, NodeUpdate};
use ripple_resolver::paths::{is_relative_specifier, normalize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What one hydration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Files the run looked at.
    pub visited: usize,
    /// Files sent to the resolver.
    pub resolved: BTreeSet<PathBuf>,
    /// Missing dependencies recorded during the run.
    pub missing: BTreeSet<PathBuf>,
    /// Files that disappeared from disk and are now marked missing.
    pub vanished: BTreeSet<PathBuf>,
}

impl HydrationReport {
    pub fn merge(&mut self, other: HydrationReport) {
        self.visited += other.visited;
        self.resolved.extend(other.resolved);
        self.missing.extend(other.missing);
        self.vanished.extend(other.vanished);
    }
}

enum Decision {
    Resolve,
    Keep,
    Vanished,
    StillMissing,
}

/// Key for a specifier that matched no file.
///
/// Relative specifiers are anchored at the importing file's directory;
/// anything else is kept verbatim.
pub fn missing_key(importer: &Path, specifier: &str) -> PathBuf {
    if is_relative_specifier(specifier) {
        let base = importer.parent().unwrap_or(Path::new("/"));
        normalize(&base.join(specifier))
    } else {
        PathBuf::from(specifier)
    }
}

pub struct HydrationEngine<'a> {
    graph: &'a mut DependencyGraph,
    oracle: &'a mut FileChangeOracle,
    coordinator: &'a mut ResolutionCoordinator,
}

impl<'a> HydrationEngine<'a> {
    pub fn new(
        graph: &'a mut DependencyGraph,
        oracle: &'a mut FileChangeOracle,
        coordinator: &'a mut ResolutionCoordinator,
    ) -> Self {
        HydrationEngine {
            graph,
            oracle,
            coordinator,
        }
    }

    /// Walk from `seeds` to a fixed point. Paths in `forced` are re-resolved
    /// even if the oracle sees no change.
    pub async fn hydrate(
        &mut self,
        seeds: impl IntoIterator<Item = PathBuf>,
        forced: &BTreeSet<PathBuf>,
    ) -> Result<HydrationReport, EngineError> {
        let forced: HashSet<PathBuf> = forced.iter().map(|p| self.graph.key(p)).collect();
        let mut report = HydrationReport::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut frontier: Vec<PathBuf> = seeds.into_iter().map(|p| self.graph.key(&p)).collect();
        let mut stale: Vec<PathBuf> = Vec::new();

        loop {
            let batch: Vec<PathBuf> = frontier
                .drain(..)
                .filter(|path| seen.insert(path.clone()))
                .collect();
            if batch.is_empty() {
                break;
            }
            report.visited += batch.len();

            let mut to_resolve = Vec::new();
            let mut unchanged = Vec::new();
            for path in batch {
                match self.decide(&path, &forced)? {
                    Decision::Resolve => to_resolve.push(path),
                    Decision::Keep => unchanged.push(path),
                    Decision::Vanished => {
                        debug!("{} vanished, marking missing", path.display());
                        self.graph.upsert(&path, NodeUpdate::missing());
                        self.graph.clear_dependencies(&path);
                        self.oracle.forget(&path);
                        report.vanished.insert(path);
                    }
                    Decision::StillMissing => {}
                }
            }

            let mut resolutions = self.coordinator.resolve_all(to_resolve.clone()).await?;
            let mut next = Vec::new();

            for path in to_resolve {
                let resolution = resolutions.remove(&path).unwrap_or_default();
                let resolved: BTreeSet<PathBuf> =
                    resolution.resolved.iter().map(|d| self.graph.key(d)).collect();
                let missing: BTreeSet<PathBuf> = resolution
                    .missing
                    .iter()
                    .map(|specifier| self.graph.key(&missing_key(&path, specifier)))
                    .collect();

                let dropped = self.graph.replace_dependencies(&path, &resolved, &missing);
                if !dropped.is_empty() {
                    debug!("{} dropped {} dependencies", path.display(), dropped.len());
                }
                self.propagate(&path, &resolved, &missing, &seen, &mut next, &mut stale);
                report.missing.extend(missing);
                report.resolved.insert(path);
            }

            for path in unchanged {
                let (missing, resolved): (BTreeSet<PathBuf>, BTreeSet<PathBuf>) = self
                    .graph
                    .dependencies_of(&path)
                    .into_iter()
                    .partition(|d| self.graph.is_missing(d));
                self.propagate(&path, &resolved, &missing, &seen, &mut next, &mut stale);
            }

            frontier = next;
        }

        // Attribution that reached already-visited files after they were walked
        while let Some(path) = stale.pop() {
            let provenance = self.graph.provenance(&path);
            for dependency in self.graph.dependencies_of(&path) {
                if self.graph.attribute(&dependency, &provenance) {
                    stale.push(dependency);
                }
            }
        }

        info!(
            "Hydrated {} files ({} resolved, {} missing, {} vanished)",
            report.visited,
            report.resolved.len(),
            report.missing.len(),
            report.vanished.len()
        );
        Ok(report)
    }

    fn decide(&mut self, path: &Path, forced: &HashSet<PathBuf>) -> Result<Decision, EngineError> {
        if self.graph.is_missing(path) {
            if !path.is_file() {
                return Ok(Decision::StillMissing);
            }
            debug!("{} reappeared", path.display());
            self.graph.mark_found(path)?;
            self.oracle.track(path)?;
            return Ok(Decision::Resolve);
        }

        if !self.oracle.is_tracked(path) {
            return Ok(if self.oracle.track(path)? {
                Decision::Resolve
            } else {
                Decision::Vanished
            });
        }

        let changes = self.oracle.changed(Some(std::slice::from_ref(&path.to_path_buf())))?;
        if !changes.not_found.is_empty() {
            Ok(Decision::Vanished)
        } else if forced.contains(path) || !changes.changed.is_empty() {
            Ok(Decision::Resolve)
        } else {
            Ok(Decision::Keep)
        }
    }

    fn propagate(
        &mut self,
        path: &Path,
        resolved: &BTreeSet<PathBuf>,
        missing: &BTreeSet<PathBuf>,
        seen: &HashSet<PathBuf>,
        next: &mut Vec<PathBuf>,
        stale: &mut Vec<PathBuf>,
    ) {
        let provenance = self.graph.provenance(path);
        for dependency in resolved.iter().chain(missing.iter()) {
            if self.graph.attribute(dependency, &provenance) && seen.contains(dependency) {
                stale.push(dependency.clone());
            }
        }
        next.extend(resolved.iter().filter(|d| !seen.contains(*d)).cloned());
    }
}
