//! Path canonicalization applied to every path entering the graph

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How node keys are derived from paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalMode {
    /// Paths are used exactly as given.
    #[default]
    Identity,
    /// Paths are resolved through symlinks to their real location.
    RealPath,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Canonicalizer {
    mode: CanonicalMode,
}

impl Canonicalizer {
    pub fn new(mode: CanonicalMode) -> Self {
        Canonicalizer { mode }
    }

    pub fn mode(&self) -> CanonicalMode {
        self.mode
    }

    /// Resolve `path` according to the configured mode.
    ///
    /// Fails in `RealPath` mode when the path does not exist or cannot be
    /// resolved.
    pub fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        match self.mode {
            CanonicalMode::Identity => Ok(path.to_path_buf()),
            CanonicalMode::RealPath => std::fs::canonicalize(path),
        }
    }

    /// Like [`Canonicalizer::canonicalize`], falling back to the input path.
    ///
    /// Missing files have no real path, so they keep the key they were
    /// referenced by.
    pub fn canonical_or_input(&self, path: &Path) -> PathBuf {
        match self.canonicalize(path) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::trace!("Keeping {} as-is: {}", path.display(), e);
                path.to_path_buf()
            }
        }
    }
}
