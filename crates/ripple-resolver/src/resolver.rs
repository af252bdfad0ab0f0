//! Resolver trait definition

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Everything a resolver may consult besides the file itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    pub cwd: PathBuf,
    /// Resolved paths matching any of these globs are dropped.
    pub ignore_globs: Vec<String>,
    pub ts_config_path: Option<PathBuf>,
    pub webpack_config_path: Option<PathBuf>,
}

/// Dependencies of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Absolute paths of files the source references.
    pub resolved: BTreeSet<PathBuf>,
    /// Specifiers that point into the project but match no file.
    pub missing: BTreeSet<String>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.missing.is_empty()
    }

    /// Fold another partial result for the same file into this one.
    pub fn merge(&mut self, other: Resolution) {
        self.resolved.extend(other.resolved);
        self.missing.extend(other.missing);
    }
}

/// Maps one source file to the files it references.
///
/// Implementations must be deterministic for a given filesystem state and
/// must report unparseable sources as an empty [`Resolution`] instead of
/// failing.
pub trait Resolver: Send + Sync {
    fn resolve(&self, filepath: &Path, options: &ResolveOptions) -> Resolution;

    /// Same as [`Resolver::resolve`], reporting each resolved dependency as it
    /// is found.
    fn resolve_streaming(
        &self,
        filepath: &Path,
        options: &ResolveOptions,
        on_dependency: &mut dyn FnMut(&Path),
    ) -> Resolution {
        let resolution = self.resolve(filepath, options);
        for dependency in &resolution.resolved {
            on_dependency(dependency);
        }
        resolution
    }

    /// One-time setup run on the resolving thread before it accepts work.
    fn prepare(&self) {}
}
