//! Integration tests for Ripple
//!
//! These tests drive the `ripple` binary against small on-disk projects.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn scenario() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("A.js"), "require('./D');\n").unwrap();
    fs::write(src.join("B.js"), "import t from './T';\nimport d from './D';\n").unwrap();
    fs::write(src.join("T.js"), "export default require('./D');\n").unwrap();
    fs::write(src.join("D.js"), "module.exports = 1;\n").unwrap();
    temp_dir
}

fn ripple(root: &Path, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_ripple"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute ripple");
    assert!(
        output.status.success(),
        "ripple {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn with_entries<'a>(args: &[&'a str]) -> Vec<&'a str> {
    let mut all: Vec<&'a str> = vec!["--entry", "src/A.js", "--entry", "src/B.js"];
    all.extend_from_slice(args);
    all
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_ripple"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Incremental dependency graph and affected-file analysis"));
    assert!(stdout.contains("affected"));
}

#[test]
fn test_version() {
    let temp_dir = TempDir::new().unwrap();
    let output = ripple(temp_dir.path(), &["version"]);
    assert_eq!(
        stdout_lines(&output),
        vec![format!("Ripple v{}", env!("CARGO_PKG_VERSION"))]
    );
}

#[test]
fn test_hydrate_then_affected() {
    let repo = scenario();
    let root = repo.path();

    let output = ripple(root, &with_entries(&["hydrate"]));
    assert_eq!(
        stdout_lines(&output),
        vec!["4 files, 4 edges, 2 entry files, 0 missing".to_string()]
    );
    assert!(root.join(".ripple/graph.json").is_file());
    assert!(root.join(".ripple/fingerprints.json").is_file());

    fs::write(root.join("src/D.js"), "module.exports = 2;\n").unwrap();
    let output = ripple(root, &with_entries(&["affected", "--json"]));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries: Vec<&str> = json["affectedEntryFiles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(
        entries,
        vec![
            root.join("src/A.js").to_str().unwrap(),
            root.join("src/B.js").to_str().unwrap()
        ]
    );
    assert_eq!(json["affectedFiles"].as_array().unwrap().len(), 4);

    // Nothing changed since the last query
    let output = ripple(root, &with_entries(&["affected"]));
    assert!(stdout_lines(&output).is_empty());
}

#[test]
fn test_affected_with_explicit_path() {
    let repo = scenario();
    let root = repo.path();
    ripple(root, &with_entries(&["hydrate"]));

    let output = ripple(root, &with_entries(&["affected", "--all", "src/T.js"]));

    assert_eq!(
        stdout_lines(&output),
        vec![
            root.join("src/B.js").display().to_string(),
            format!("  {}", root.join("src/T.js").display())
        ]
    );
}

#[test]
fn test_config_file_and_threaded_resolution() {
    let repo = scenario();
    let root = repo.path();
    fs::write(
        root.join("ripple.toml"),
        "entry_files = [\"src/A.js\", \"src/B.js\"]\nresolution = \"threaded\"\nwire_shape = \"batched\"\n",
    )
    .unwrap();

    let output = ripple(root, &["hydrate"]);
    assert_eq!(
        stdout_lines(&output),
        vec!["4 files, 4 edges, 2 entry files, 0 missing".to_string()]
    );
}

#[test]
fn test_prune_and_clear() {
    let repo = scenario();
    let root = repo.path();
    fs::write(root.join("src/A.js"), "require('./D');\nrequire('./gone');\n").unwrap();

    let output = ripple(root, &with_entries(&["hydrate"]));
    assert_eq!(
        stdout_lines(&output),
        vec!["5 files, 5 edges, 2 entry files, 1 missing".to_string()]
    );

    fs::write(root.join("src/A.js"), "require('./D');\n").unwrap();
    let output = ripple(root, &with_entries(&["affected"]));
    assert_eq!(stdout_lines(&output), vec![root.join("src/A.js").display().to_string()]);

    let output = ripple(root, &with_entries(&["prune"]));
    assert_eq!(stdout_lines(&output), vec![root.join("src/gone").display().to_string()]);

    ripple(root, &["clear"]);
    assert!(!root.join(".ripple").exists());
}
