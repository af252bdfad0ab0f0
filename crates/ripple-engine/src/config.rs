//! Engine configuration, loadable from `ripple.toml`

use crate::coordinator::ResolutionMode;
use crate::error::ConfigError;
use crate::worker::WireShape;
use ripple_core::{CanonicalMode, Canonicalizer, FINGERPRINT_CACHE, GRAPH_CACHE, cache_dir};
use ripple_resolver::ResolveOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILE: &str = "ripple.toml";

const DEFAULT_READY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Project root. Relative paths below are resolved against it.
    pub cwd: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub graph_cache_file: String,
    pub fingerprint_cache_file: String,
    pub entry_files: Vec<PathBuf>,
    pub ignore_globs: Vec<String>,
    pub canonical_mode: CanonicalMode,
    pub ts_config_path: Option<PathBuf>,
    pub webpack_config_path: Option<PathBuf>,
    pub resolution: ResolutionMode,
    pub wire_shape: WireShape,
    pub worker_ready_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cwd: PathBuf::from("."),
            cache_dir: None,
            graph_cache_file: GRAPH_CACHE.to_string(),
            fingerprint_cache_file: FINGERPRINT_CACHE.to_string(),
            entry_files: Vec::new(),
            ignore_globs: Vec::new(),
            canonical_mode: CanonicalMode::default(),
            ts_config_path: None,
            webpack_config_path: None,
            resolution: ResolutionMode::default(),
            wire_shape: WireShape::default(),
            worker_ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        EngineConfig {
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read `path`. A `cwd` missing from the file defaults to the file's
    /// directory.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Self::from_toml_str(&contents)?;
        let base = path.parent().unwrap_or(Path::new("."));
        config.cwd = if config.cwd == Path::new(".") {
            base.to_path_buf()
        } else {
            absolutize(base, &config.cwd)
        };
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `<cwd>/ripple.toml` when present, defaults otherwise.
    pub async fn discover(cwd: &Path) -> Result<Self, ConfigError> {
        let path = cwd.join(CONFIG_FILE);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Self::load(&path).await
        } else {
            Ok(Self::new(cwd))
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => absolutize(&self.cwd, dir),
            None => cache_dir(&self.cwd),
        }
    }

    pub fn graph_cache_path(&self) -> PathBuf {
        self.cache_dir().join(&self.graph_cache_file)
    }

    pub fn fingerprint_cache_path(&self) -> PathBuf {
        self.cache_dir().join(&self.fingerprint_cache_file)
    }

    pub fn entry_paths(&self) -> Vec<PathBuf> {
        self.entry_files
            .iter()
            .map(|entry| absolutize(&self.cwd, entry))
            .collect()
    }

    pub fn canonicalizer(&self) -> Canonicalizer {
        Canonicalizer::new(self.canonical_mode)
    }

    pub fn worker_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_ready_timeout_ms)
    }

    /// Resolver options with config paths made absolute and the cache
    /// directory always ignored.
    pub fn resolve_options(&self) -> ResolveOptions {
        let mut ignore_globs = self.ignore_globs.clone();
        ignore_globs.push(format!("{}/**", self.cache_dir().display()));
        ResolveOptions {
            cwd: self.cwd.clone(),
            ignore_globs,
            ts_config_path: self.ts_config_path.as_ref().map(|p| absolutize(&self.cwd, p)),
            webpack_config_path: self
                .webpack_config_path
                .as_ref()
                .map(|p| absolutize(&self.cwd, p)),
        }
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
