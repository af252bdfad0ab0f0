//! Test utilities for Ripple Engine

use crate::config::EngineConfig;
use ripple_resolver::{Resolution, ResolveOptions, Resolver, StaticResolver};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Entry A requires D; entry B requires T and D; T requires D.
pub const SCENARIO: &[(&str, &str)] = &[
    ("src/A.js", "const d = require('./D');\n"),
    ("src/B.js", "import t from './T';\nimport d from './D';\n"),
    ("src/T.js", "export default require('./D');\n"),
    ("src/D.js", "module.exports = 1;\n"),
];

pub fn create_test_repo(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (relative, content) in files {
        write_file(temp_dir.path(), relative, content);
    }
    temp_dir
}

pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Config for `root` with A and B as entry files.
pub fn scenario_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::new(root);
    config.entry_files = vec![PathBuf::from("src/A.js"), PathBuf::from("src/B.js")];
    config
}

/// Wraps the static resolver and records every file it is asked about.
#[derive(Default)]
pub struct CountingResolver {
    inner: StaticResolver,
    calls: Mutex<Vec<PathBuf>>,
}

impl CountingResolver {
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Resolver for CountingResolver {
    fn resolve(&self, filepath: &Path, options: &ResolveOptions) -> Resolution {
        self.calls.lock().unwrap().push(filepath.to_path_buf());
        self.inner.resolve(filepath, options)
    }
}

/// Takes `delay` to become ready.
pub struct SlowStartResolver {
    pub delay: Duration,
}

impl Resolver for SlowStartResolver {
    fn resolve(&self, _filepath: &Path, _options: &ResolveOptions) -> Resolution {
        Resolution::default()
    }

    fn prepare(&self) {
        std::thread::sleep(self.delay);
    }
}

/// Takes `delay` for every file.
pub struct SlowResolver {
    pub delay: Duration,
}

impl Resolver for SlowResolver {
    fn resolve(&self, _filepath: &Path, _options: &ResolveOptions) -> Resolution {
        std::thread::sleep(self.delay);
        Resolution::default()
    }
}

/// Panics on every file, or while preparing when `on_prepare` is set.
pub struct PanickingResolver {
    pub on_prepare: bool,
}

impl Resolver for PanickingResolver {
    fn resolve(&self, filepath: &Path, _options: &ResolveOptions) -> Resolution {
        panic!("cannot resolve {}", filepath.display());
    }

    fn prepare(&self) {
        if self.on_prepare {
            panic!("resolver failed to start");
        }
    }
}

/// Fixed answers, keyed by file.
#[derive(Default)]
pub struct FixedResolver {
    pub answers: Vec<(PathBuf, Resolution)>,
}

impl Resolver for FixedResolver {
    fn resolve(&self, filepath: &Path, _options: &ResolveOptions) -> Resolution {
        self.answers
            .iter()
            .find(|(path, _)| path == filepath)
            .map(|(_, resolution)| resolution.clone())
            .unwrap_or_default()
    }
}
