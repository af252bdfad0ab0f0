//! Specifier to file path resolution

use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Extensions tried, in order, for extensionless specifiers.
pub const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "json"];

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn with_extension_appended(path: &Path, extension: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(extension);
    PathBuf::from(raw)
}

/// Find the file a module path refers to: the exact file, then with each known
/// extension, then a TypeScript source for a `.js` specifier, then
/// `index.<ext>` inside a directory.
pub fn probe(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    for extension in EXTENSIONS {
        let with_extension = with_extension_appended(candidate, extension);
        if with_extension.is_file() {
            return Some(with_extension);
        }
    }
    if matches!(candidate.extension().and_then(|e| e.to_str()), Some("js" | "jsx")) {
        for extension in ["ts", "tsx"] {
            let typescript = candidate.with_extension(extension);
            if typescript.is_file() {
                return Some(typescript);
            }
        }
    }
    if candidate.is_dir() {
        for extension in EXTENSIONS {
            let index = candidate.join(format!("index.{extension}"));
            if index.is_file() {
                return Some(index);
            }
        }
    }
    None
}

pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

#[derive(Debug, thiserror::Error)]
pub enum TsConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompilerOptions {
    base_url: Option<PathBuf>,
    #[serde(default)]
    paths: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    #[serde(default)]
    compiler_options: CompilerOptions,
}

/// The module-resolution subset of a `tsconfig.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsConfig {
    pub path: PathBuf,
    /// Directory `paths` targets are relative to.
    pub base_dir: PathBuf,
    pub has_base_url: bool,
    pub aliases: Vec<(String, Vec<String>)>,
}

impl TsConfig {
    pub fn load(path: &Path) -> Result<Self, TsConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TsConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: RawTsConfig =
            serde_json::from_str(&strip_jsonc(&raw)).map_err(|source| TsConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let config_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let options = parsed.compiler_options;
        let has_base_url = options.base_url.is_some();
        let base_dir = normalize(&config_dir.join(options.base_url.unwrap_or_default()));

        // Longest prefix wins, as in the TypeScript compiler
        let mut aliases: Vec<(String, Vec<String>)> = options.paths.into_iter().collect();
        aliases.sort_by_key(|(pattern, _)| std::cmp::Reverse(pattern.split('*').next().map_or(0, str::len)));

        Ok(TsConfig {
            path: path.to_path_buf(),
            base_dir,
            has_base_url,
            aliases,
        })
    }

    /// Candidate module paths for a non-relative specifier.
    pub fn candidates(&self, specifier: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for (pattern, targets) in &self.aliases {
            let Some(captured) = match_pattern(pattern, specifier) else {
                continue;
            };
            for target in targets {
                let substituted = target.replacen('*', captured, 1);
                candidates.push(normalize(&self.base_dir.join(substituted)));
            }
        }
        if self.has_base_url {
            candidates.push(normalize(&self.base_dir.join(specifier)));
        }
        candidates
    }

    /// Whether any alias pattern claims `specifier`.
    pub fn claims(&self, specifier: &str) -> bool {
        self.aliases
            .iter()
            .any(|(pattern, _)| match_pattern(pattern, specifier).is_some())
    }
}

/// Drop `//` and `/* */` comments and trailing commas, which `tsconfig.json`
/// allows and plain JSON does not. String contents are left alone.
fn strip_jsonc(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
                out.push(' ');
            }
            (']' | '}', _) => {
                let trimmed = out.trim_end_matches(char::is_whitespace).len();
                if out[..trimmed].ends_with(',') {
                    out.remove(trimmed - 1);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Match a `paths` pattern with at most one `*`, returning the captured part.
fn match_pattern<'a>(pattern: &str, specifier: &'a str) -> Option<&'a str> {
    match pattern.split_once('*') {
        None => (pattern == specifier).then_some(""),
        Some((prefix, suffix)) => {
            if specifier.len() < prefix.len() + suffix.len() {
                return None;
            }
            specifier
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
        }
    }
}
