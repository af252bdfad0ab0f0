//! File fingerprinting for change detection
//!
//! The oracle keeps one fingerprint per known path. Size and mtime act as the
//! cheap first check; the SHA-256 digest decides when they differ, so a file
//! that was only touched is not reported as changed.

use crate::cache;
use crate::error::{CacheError, OracleError, SaveError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub size: u64,
    pub mtime_ms: u64,
    pub digest: String,
}

/// Flat `path -> fingerprint` document as stored on disk.
pub type FingerprintDocument = BTreeMap<PathBuf, Fingerprint>;

struct FileStat {
    size: u64,
    mtime_ms: u64,
}

fn stat(path: &Path) -> Result<Option<FileStat>, OracleError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {
            let mtime_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_millis() as u64);
            Ok(Some(FileStat {
                size: meta.len(),
                mtime_ms,
            }))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(OracleError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn digest(path: &Path) -> Result<String, OracleError> {
    let content = std::fs::read(path).map_err(|source| OracleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

impl Fingerprint {
    /// Fingerprint a file on disk. `None` when it does not exist.
    pub fn compute(path: &Path) -> Result<Option<Self>, OracleError> {
        let Some(stat) = stat(path)? else {
            return Ok(None);
        };
        Ok(Some(Fingerprint {
            size: stat.size,
            mtime_ms: stat.mtime_ms,
            digest: digest(path)?,
        }))
    }
}

/// Outcome of a change query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed: BTreeSet<PathBuf>,
    pub not_found: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.not_found.is_empty()
    }

    /// Changed and vanished paths together.
    pub fn all(&self) -> BTreeSet<PathBuf> {
        self.changed.union(&self.not_found).cloned().collect()
    }
}

/// Per-file fingerprint store answering "has this file changed?".
#[derive(Debug)]
pub struct FileChangeOracle {
    cache_path: PathBuf,
    /// `None` marks a known path without usable history.
    fingerprints: BTreeMap<PathBuf, Option<Fingerprint>>,
    forced: BTreeSet<PathBuf>,
}

impl FileChangeOracle {
    /// An empty oracle persisting to `cache_path`.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        FileChangeOracle {
            cache_path: cache_path.into(),
            fingerprints: BTreeMap::new(),
            forced: BTreeSet::new(),
        }
    }

    /// Load the persisted snapshot. A missing cache file starts empty.
    pub async fn load(cache_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let mut oracle = FileChangeOracle::new(cache_path);
        if let Some(document) = cache::load_fingerprints(&oracle.cache_path).await? {
            tracing::debug!(
                "Loaded {} fingerprints from {}",
                document.len(),
                oracle.cache_path.display()
            );
            oracle.fingerprints = document.into_iter().map(|(p, f)| (p, Some(f))).collect();
        }
        Ok(oracle)
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.fingerprints.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.fingerprints.keys()
    }

    /// Start tracking `path` with its current fingerprint.
    ///
    /// Returns true if the path was not known before. Paths that do not exist
    /// on disk are not tracked.
    pub fn track(&mut self, path: &Path) -> Result<bool, OracleError> {
        if self.is_tracked(path) {
            return Ok(false);
        }
        match Fingerprint::compute(path)? {
            Some(fingerprint) => {
                self.fingerprints.insert(path.to_path_buf(), Some(fingerprint));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop tracking `path`.
    pub fn forget(&mut self, path: &Path) {
        self.fingerprints.remove(path);
        self.forced.remove(path);
    }

    /// Force the next [`FileChangeOracle::changed`] to report `path`.
    pub fn mark_changed(&mut self, path: &Path) {
        self.forced.insert(path.to_path_buf());
    }

    /// Compare `paths` (or every known path) against the filesystem.
    ///
    /// The stored fingerprints are updated as a side effect, so asking twice
    /// without a filesystem change reports nothing the second time. Vanished
    /// files are reported once and then forgotten.
    pub fn changed(&mut self, paths: Option<&[PathBuf]>) -> Result<ChangeSet, OracleError> {
        let paths: Vec<PathBuf> = match paths {
            Some(paths) => {
                if let Some(unknown) = paths.iter().find(|p| !self.is_tracked(p)) {
                    return Err(OracleError::Untracked(unknown.clone()));
                }
                paths.to_vec()
            }
            None => self.fingerprints.keys().cloned().collect(),
        };

        let mut changes = ChangeSet::default();
        for path in paths {
            let forced = self.forced.remove(&path);
            let Some(stat) = stat(&path)? else {
                self.fingerprints.remove(&path);
                changes.not_found.insert(path);
                continue;
            };

            let baseline = self.fingerprints.get(&path).cloned().flatten();
            let current = match baseline {
                Some(previous)
                    if previous.size == stat.size && previous.mtime_ms == stat.mtime_ms =>
                {
                    if forced {
                        changes.changed.insert(path.clone());
                    }
                    continue;
                }
                Some(previous) => {
                    let fingerprint = Fingerprint {
                        size: stat.size,
                        mtime_ms: stat.mtime_ms,
                        digest: digest(&path)?,
                    };
                    if forced || fingerprint.digest != previous.digest {
                        changes.changed.insert(path.clone());
                    }
                    fingerprint
                }
                None => {
                    changes.changed.insert(path.clone());
                    Fingerprint {
                        size: stat.size,
                        mtime_ms: stat.mtime_ms,
                        digest: digest(&path)?,
                    }
                }
            };
            self.fingerprints.insert(path, Some(current));
        }

        if !changes.is_empty() {
            tracing::debug!(
                "{} changed, {} not found",
                changes.changed.len(),
                changes.not_found.len()
            );
        }
        Ok(changes)
    }

    /// Snapshot of the fingerprints for `paths`, computing any that are
    /// unknown. Paths that no longer exist are left out.
    pub fn snapshot<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a PathBuf>,
    ) -> Result<FingerprintDocument, OracleError> {
        let mut document = FingerprintDocument::new();
        for path in paths {
            let fingerprint = match self.fingerprints.get(path) {
                Some(Some(fingerprint)) => Some(fingerprint.clone()),
                _ => Fingerprint::compute(path)?,
            };
            if let Some(fingerprint) = fingerprint {
                document.insert(path.clone(), fingerprint);
            }
        }
        Ok(document)
    }

    /// Persist fingerprints for exactly `paths`; everything else is dropped.
    pub async fn save<'a>(
        &mut self,
        paths: impl IntoIterator<Item = &'a PathBuf>,
    ) -> Result<usize, SaveError> {
        let document = self.snapshot(paths)?;
        cache::save_fingerprints(&document, &self.cache_path).await?;
        let saved = document.len();
        self.fingerprints = document.into_iter().map(|(p, f)| (p, Some(f))).collect();
        Ok(saved)
    }

    /// Forget all fingerprint history; every known path reports as changed.
    pub fn reset(&mut self) {
        for fingerprint in self.fingerprints.values_mut() {
            *fingerprint = None;
        }
        self.forced.clear();
    }
}

