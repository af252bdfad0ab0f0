//! Default resolver for JavaScript and TypeScript sources

use crate::extractor::{SourceKind, extract_specifiers};
use crate::paths::{TsConfig, is_relative_specifier, normalize, probe};
use crate::resolver::{Resolution, ResolveOptions, Resolver};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Resolves literal imports of JS/TS files against the filesystem.
///
/// Bare package specifiers are external and never reported. Relative,
/// absolute and tsconfig-aliased specifiers that match no file are reported
/// as missing.
#[derive(Default)]
pub struct StaticResolver {
    ignore: Mutex<Option<(Vec<String>, Arc<GlobSet>)>>,
    ts_config: Mutex<Option<(PathBuf, Option<SystemTime>, Option<Arc<TsConfig>>)>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn ignore_set(&self, globs: &[String]) -> Arc<GlobSet> {
        let mut cached = self.ignore.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((key, set)) = cached.as_ref() {
            if key.as_slice() == globs {
                return Arc::clone(set);
            }
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in globs {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!("Ignoring invalid glob {}: {}", pattern, e),
            }
        }
        let set = Arc::new(builder.build().unwrap_or_else(|e| {
            warn!("Failed to build ignore globs: {}", e);
            GlobSet::empty()
        }));
        *cached = Some((globs.to_vec(), Arc::clone(&set)));
        set
    }

    /// tsconfig for `path`, reloaded when the file's mtime moves.
    fn ts_config(&self, path: &Path) -> Option<Arc<TsConfig>> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let mut cached = self.ts_config.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_path, cached_modified, config)) = cached.as_ref() {
            if cached_path == path && *cached_modified == modified {
                return config.clone();
            }
        }

        let config = match TsConfig::load(path) {
            Ok(config) => Some(Arc::new(config)),
            Err(e) => {
                warn!("Ignoring tsconfig: {}", e);
                None
            }
        };
        *cached = Some((path.to_path_buf(), modified, config.clone()));
        config
    }

    fn resolve_specifier(
        &self,
        importer: &Path,
        specifier: &str,
        options: &ResolveOptions,
        ts_config: Option<&TsConfig>,
    ) -> Target {
        if is_relative_specifier(specifier) {
            let base = importer.parent().unwrap_or(options.cwd.as_path());
            return probe_or_missing(&normalize(&base.join(specifier)));
        }
        if Path::new(specifier).is_absolute() {
            return probe_or_missing(&normalize(Path::new(specifier)));
        }

        let Some(ts_config) = ts_config else {
            return Target::External;
        };
        for candidate in ts_config.candidates(specifier) {
            if let Some(found) = probe(&candidate) {
                return Target::Aliased(found);
            }
        }
        if ts_config.claims(specifier) {
            Target::Missing
        } else {
            Target::External
        }
    }
}

enum Target {
    File(PathBuf),
    Aliased(PathBuf),
    Missing,
    External,
}

fn probe_or_missing(candidate: &Path) -> Target {
    match probe(candidate) {
        Some(found) => Target::File(found),
        None => Target::Missing,
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, filepath: &Path, options: &ResolveOptions) -> Resolution {
        let mut resolution = Resolution::default();

        let Some(kind) = SourceKind::from_path(filepath) else {
            return resolution;
        };
        let source = match std::fs::read(filepath) {
            Ok(source) => source,
            Err(e) => {
                debug!("Cannot read {}: {}", filepath.display(), e);
                return resolution;
            }
        };
        let specifiers = match extract_specifiers(kind, &source) {
            Ok(specifiers) => specifiers,
            Err(e) => {
                debug!("Cannot parse {}: {}", filepath.display(), e);
                return resolution;
            }
        };

        let ignore = self.ignore_set(&options.ignore_globs);
        let ts_config = options
            .ts_config_path
            .as_deref()
            .and_then(|path| self.ts_config(path));

        for specifier in specifiers {
            match self.resolve_specifier(filepath, &specifier, options, ts_config.as_deref()) {
                Target::File(path) => {
                    if !ignore.is_match(&path) {
                        resolution.resolved.insert(path);
                    }
                }
                Target::Aliased(path) => {
                    if !ignore.is_match(&path) {
                        resolution.resolved.insert(path);
                    }
                    if let Some(config) = &ts_config {
                        resolution.resolved.insert(config.path.clone());
                    }
                }
                Target::Missing => {
                    resolution.missing.insert(specifier);
                }
                Target::External => {}
            }
        }

        resolution.resolved.remove(filepath);
        resolution
    }
}
