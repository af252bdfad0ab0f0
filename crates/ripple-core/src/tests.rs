//! Unit tests for ripple-core module

use crate::test_utils::*;
use crate::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(|s| PathBuf::from(s)).collect()
}

#[test]
fn test_upsert_creates_nodes_and_edges() {
    let graph = scenario_graph();

    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.dependents_of(&p("/src/D.js")), set(&["/src/A.js", "/src/B.js", "/src/T.js"]));
    assert_eq!(graph.dependencies_of(&p("/src/B.js")), set(&["/src/D.js", "/src/T.js"]));
    assert!(graph.is_entry_file(&p("/src/A.js")));
    assert!(!graph.is_entry_file(&p("/src/T.js")));
}

#[test]
fn test_upsert_is_a_merge() {
    let mut graph = scenario_graph();

    // Re-adding an existing edge does not duplicate it
    graph.upsert(&p("/src/D.js"), NodeUpdate::dependency_of("/src/A.js"));
    assert_eq!(graph.edge_count(), 4);

    // entry_file only promotes
    graph.upsert(&p("/src/A.js"), NodeUpdate::default());
    assert!(graph.is_entry_file(&p("/src/A.js")));

    graph.upsert(&p("/src/T.js"), NodeUpdate::entry());
    assert!(graph.is_entry_file(&p("/src/T.js")));
}

#[test]
fn test_lookups_on_absent_nodes() {
    let graph = scenario_graph();
    let unknown = p("/src/unknown.js");

    assert!(!graph.has(&unknown));
    assert!(!graph.is_missing(&unknown));
    assert!(!graph.is_entry_file(&unknown));
    assert!(graph.entry_files_reachable_from(&unknown).is_empty());
    assert_eq!(graph.ancestors_and_entry_files(&unknown), AncestorSet::default());
}

#[test]
fn test_missing_round_trip() {
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/src/A.js"), NodeUpdate::entry());
    graph.upsert(
        &p("/src/gone.js"),
        NodeUpdate::dependency_of("/src/A.js").with_missing(true),
    );

    assert!(graph.is_missing(&p("/src/gone.js")));
    let before = graph.attributes(&p("/src/gone.js")).cloned().unwrap();

    graph.mark_found(&p("/src/gone.js")).unwrap();
    assert!(!graph.is_missing(&p("/src/gone.js")));

    graph.mark_missing(&p("/src/gone.js")).unwrap();
    assert_eq!(graph.attributes(&p("/src/gone.js")), Some(&before));
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn test_mark_on_unknown_node_fails() {
    let mut graph = scenario_graph();

    let err = graph.mark_missing(&p("/src/nope.js")).unwrap_err();
    assert!(matches!(err, GraphError::NotFound(ref path) if path == &p("/src/nope.js")));
    assert!(graph.mark_found(&p("/src/nope.js")).is_err());
}

#[test]
fn test_replace_dependencies_drops_stale_edges() {
    let mut graph = scenario_graph();

    let dropped = graph.replace_dependencies(
        &p("/src/B.js"),
        &set(&["/src/T.js"]),
        &set(&["/src/missing.js"]),
    );

    assert_eq!(dropped, set(&["/src/D.js"]));
    assert_eq!(graph.dependencies_of(&p("/src/B.js")), set(&["/src/T.js", "/src/missing.js"]));
    assert!(graph.is_missing(&p("/src/missing.js")));
    assert!(!graph.dependents_of(&p("/src/D.js")).contains(&p("/src/B.js")));
}

#[test]
fn test_missing_dependency_keeps_no_dependencies() {
    let mut graph = scenario_graph();

    // T vanished and is now reported missing by B
    graph.replace_dependencies(&p("/src/B.js"), &set(&["/src/D.js"]), &set(&["/src/T.js"]));

    assert!(graph.is_missing(&p("/src/T.js")));
    assert!(graph.dependencies_of(&p("/src/T.js")).is_empty());
}

#[test]
fn test_entry_files_reachable_from() {
    let graph = scenario_graph();

    assert_eq!(graph.entry_files_reachable_from(&p("/src/D.js")), set(&["/src/A.js", "/src/B.js"]));
    assert_eq!(graph.entry_files_reachable_from(&p("/src/T.js")), set(&["/src/B.js"]));
    assert_eq!(graph.entry_files_reachable_from(&p("/src/A.js")), set(&["/src/A.js"]));
}

#[test]
fn test_ancestors_follow_every_route() {
    let graph = scenario_graph();

    let from_d = graph.ancestors_and_entry_files(&p("/src/D.js"));
    assert_eq!(from_d.entry_files, set(&["/src/A.js", "/src/B.js"]));
    assert_eq!(from_d.ancestors, set(&["/src/A.js", "/src/B.js", "/src/T.js"]));

    let from_t = graph.ancestors_and_entry_files(&p("/src/T.js"));
    assert_eq!(from_t.entry_files, set(&["/src/B.js"]));
    assert_eq!(from_t.ancestors, set(&["/src/B.js"]));
}

#[test]
fn test_ancestors_include_longer_routes() {
    // X -> Y -> Z -> E and X -> E: Y and Z are only on the longer route
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/E.js"), NodeUpdate::entry());
    graph.upsert(&p("/X.js"), NodeUpdate::dependency_of("/E.js"));
    graph.upsert(&p("/X.js"), NodeUpdate::dependency_of("/Y.js"));
    graph.upsert(&p("/Y.js"), NodeUpdate::dependency_of("/Z.js"));
    graph.upsert(&p("/Z.js"), NodeUpdate::dependency_of("/E.js"));

    let result = graph.ancestors_and_entry_files(&p("/X.js"));
    assert_eq!(result.ancestors, set(&["/E.js", "/Y.js", "/Z.js"]));
}

#[test]
fn test_traversal_survives_cycles() {
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/E.js"), NodeUpdate::entry());
    graph.upsert(&p("/a.js"), NodeUpdate::dependency_of("/b.js"));
    graph.upsert(&p("/b.js"), NodeUpdate::dependency_of("/a.js"));
    graph.upsert(&p("/b.js"), NodeUpdate::dependency_of("/E.js"));

    assert_eq!(graph.entry_files_reachable_from(&p("/a.js")), set(&["/E.js"]));
    let result = graph.ancestors_and_entry_files(&p("/a.js"));
    assert_eq!(result.ancestors, set(&["/b.js", "/E.js"]));
}

#[test]
fn test_filter_untracked() {
    let graph = scenario_graph();
    let paths = vec![p("/src/A.js"), p("/src/new.js"), p("/src/T.js")];

    assert_eq!(graph.filter_untracked(&paths), set(&["/src/new.js"]));
}

#[test]
fn test_prune_removes_orphaned_missing_nodes() {
    let mut graph = scenario_graph();
    graph.upsert(
        &p("/src/gone.js"),
        NodeUpdate::dependency_of("/src/T.js").with_missing(true),
    );
    graph.upsert(
        &p("/src/kept.js"),
        NodeUpdate::dependency_of("/src/A.js").with_missing(true),
    );

    // Nothing is orphaned yet
    assert!(graph.prune().is_empty());

    graph.replace_dependencies(&p("/src/T.js"), &set(&["/src/D.js"]), &BTreeSet::new());
    let report = graph.prune();

    assert_eq!(report.removed, set(&["/src/gone.js"]));
    assert!(graph.has(&p("/src/kept.js")));
    assert!(!graph.has(&p("/src/gone.js")));
}

#[test]
fn test_prune_keeps_missing_entry_files() {
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/src/late.test.js"), NodeUpdate::entry().with_missing(true));
    graph.upsert(
        &p("/src/gone.js"),
        NodeUpdate::dependency_of("/src/main.js").with_missing(true),
    );
    graph.replace_dependencies(&p("/src/main.js"), &BTreeSet::new(), &BTreeSet::new());

    let report = graph.prune();

    assert_eq!(report.removed, set(&["/src/gone.js"]));
    assert!(graph.is_entry_file(&p("/src/late.test.js")));
    assert!(graph.is_missing(&p("/src/late.test.js")));
}

#[test]
fn test_remove_cascades_and_leaves_no_dangling_edges() {
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/E.js"), NodeUpdate::entry());
    graph.upsert(&p("/P.js"), NodeUpdate::dependency_of("/E.js"));
    graph.upsert(&p("/shared.js"), NodeUpdate::dependency_of("/P.js"));
    graph.upsert(&p("/shared.js"), NodeUpdate::dependency_of("/E.js"));
    graph.upsert(&p("/only-p.js"), NodeUpdate::dependency_of("/P.js").with_missing(true));

    let report = graph.remove(&p("/P.js")).unwrap();

    assert_eq!(report.removed, set(&["/P.js", "/only-p.js"]));
    assert_eq!(report.affected, set(&["/E.js", "/shared.js"]));
    assert_eq!(graph.dependencies_of(&p("/E.js")), set(&["/shared.js"]));
    assert_eq!(graph.edge_count(), 1);

    let document = graph.to_document();
    let keys: BTreeSet<PathBuf> = document.nodes.iter().map(|n| n.key.clone()).collect();
    for edge in &document.edges {
        assert!(keys.contains(&edge.source) && keys.contains(&edge.target));
    }
}

#[test]
fn test_attribution_helpers() {
    let mut graph = scenario_graph();

    assert_eq!(graph.provenance(&p("/src/A.js")), set(&["/src/A.js"]));
    assert!(graph.attribute(&p("/src/T.js"), &set(&["/src/B.js"])));
    assert!(!graph.attribute(&p("/src/T.js"), &set(&["/src/B.js"])));
    assert_eq!(graph.provenance(&p("/src/T.js")), set(&["/src/B.js"]));

    graph.refresh_attribution();
    assert_eq!(graph.attribution(&p("/src/D.js")), set(&["/src/A.js", "/src/B.js"]));
    assert_eq!(graph.attribution(&p("/src/T.js")), set(&["/src/B.js"]));
    assert!(graph.attribution(&p("/src/A.js")).is_empty());
}

#[test]
fn test_document_round_trip() {
    let mut graph = scenario_graph();
    graph.upsert(&p("/src/gone.js"), NodeUpdate::dependency_of("/src/T.js").with_missing(true));
    graph.refresh_attribution();

    let document = graph.to_document();
    let restored = DependencyGraph::from_document(document.clone(), Canonicalizer::default());

    assert_eq!(restored.to_document(), document);
    assert!(restored.is_missing(&p("/src/gone.js")));
    assert_eq!(restored.attribution(&p("/src/D.js")), set(&["/src/A.js", "/src/B.js"]));
}

#[test]
fn test_document_format() {
    let mut graph = DependencyGraph::default();
    graph.upsert(&p("/a.js"), NodeUpdate::entry());
    graph.upsert(&p("/b.js"), NodeUpdate::dependency_of("/a.js").with_missing(true));

    insta::assert_json_snapshot!(graph.to_document(), @r###"
    {
      "nodes": [
        {
          "key": "/a.js",
          "attributes": {
            "missing": false,
            "entryFile": true
          }
        },
        {
          "key": "/b.js",
          "attributes": {
            "missing": true,
            "entryFile": false
          }
        }
      ],
      "edges": [
        {
          "source": "/b.js",
          "target": "/a.js"
        }
      ],
      "options": {
        "type": "directed",
        "multi": false,
        "allowSelfLoops": true
      }
    }
    "###);
}

#[tokio::test]
async fn test_graph_cache_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join(CACHE_DIR).join(GRAPH_CACHE);
    let graph = scenario_graph();

    save_graph(&graph, &path).await.unwrap();
    let loaded = load_graph(&path, Canonicalizer::default()).await.unwrap().unwrap();

    assert_eq!(loaded.to_document(), graph.to_document());
}

#[tokio::test]
async fn test_absent_cache_loads_as_none() {
    let dir = tempfile::TempDir::new().unwrap();

    let graph = load_graph(&dir.path().join(GRAPH_CACHE), Canonicalizer::default())
        .await
        .unwrap();
    let fingerprints = load_fingerprints(&dir.path().join(FINGERPRINT_CACHE)).await.unwrap();

    assert!(graph.is_none());
    assert!(fingerprints.is_none());
}

#[tokio::test]
async fn test_corrupt_cache_is_fatal() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_file(dir.path(), GRAPH_CACHE, "{ not json");

    let err = load_graph(&path, Canonicalizer::default()).await.unwrap_err();
    assert!(matches!(err, CacheError::Corrupt { .. }));

    let path = write_file(dir.path(), FINGERPRINT_CACHE, "[1, 2");
    assert!(FileChangeOracle::load(&path).await.is_err());
}

#[test]
fn test_oracle_consumes_changes() {
    let repo = create_test_repo(&[("a.js", "one")]);
    let a = repo.path().join("a.js");
    let mut oracle = FileChangeOracle::new(repo.path().join(FINGERPRINT_CACHE));

    assert!(oracle.track(&a).unwrap());
    assert!(!oracle.track(&a).unwrap());
    assert!(oracle.changed(None).unwrap().is_empty());

    write_file(repo.path(), "a.js", "one two three");
    let changes = oracle.changed(None).unwrap();
    assert_eq!(changes.changed, BTreeSet::from([a.clone()]));

    // A second query without a filesystem change reports nothing
    assert!(oracle.changed(Some(&[a.clone()])).unwrap().is_empty());
}

#[test]
fn test_oracle_mark_changed_and_not_found() {
    let repo = create_test_repo(&[("a.js", "one"), ("b.js", "two")]);
    let a = repo.path().join("a.js");
    let b = repo.path().join("b.js");
    let mut oracle = FileChangeOracle::new(repo.path().join(FINGERPRINT_CACHE));
    oracle.track(&a).unwrap();
    oracle.track(&b).unwrap();

    oracle.mark_changed(&a);
    std::fs::remove_file(&b).unwrap();

    let changes = oracle.changed(None).unwrap();
    assert_eq!(changes.changed, BTreeSet::from([a.clone()]));
    assert_eq!(changes.not_found, BTreeSet::from([b.clone()]));
    assert!(!oracle.is_tracked(&b));
    assert!(oracle.changed(None).unwrap().is_empty());
}

#[test]
fn test_oracle_rejects_untracked_paths() {
    let repo = create_test_repo(&[("a.js", "one")]);
    let mut oracle = FileChangeOracle::new(repo.path().join(FINGERPRINT_CACHE));

    let err = oracle.changed(Some(&[repo.path().join("a.js")])).unwrap_err();
    assert!(matches!(err, OracleError::Untracked(_)));
}

#[test]
fn test_oracle_reset_reports_everything() {
    let repo = create_test_repo(&[("a.js", "one"), ("b.js", "two")]);
    let mut oracle = FileChangeOracle::new(repo.path().join(FINGERPRINT_CACHE));
    oracle.track(&repo.path().join("a.js")).unwrap();
    oracle.track(&repo.path().join("b.js")).unwrap();

    oracle.reset();

    assert_eq!(oracle.changed(None).unwrap().changed.len(), 2);
    assert!(oracle.changed(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_oracle_save_and_load() {
    let repo = create_test_repo(&[("a.js", "one"), ("b.js", "two")]);
    let a = repo.path().join("a.js");
    let b = repo.path().join("b.js");
    let cache = repo.path().join(CACHE_DIR).join(FINGERPRINT_CACHE);
    let mut oracle = FileChangeOracle::new(&cache);
    oracle.track(&a).unwrap();
    oracle.track(&b).unwrap();

    // Only the given paths are persisted
    assert_eq!(oracle.save([&a]).await.unwrap(), 1);

    let mut loaded = FileChangeOracle::load(&cache).await.unwrap();
    assert!(loaded.is_tracked(&a));
    assert!(!loaded.is_tracked(&b));
    assert!(loaded.changed(None).unwrap().is_empty());

    write_file(repo.path(), "a.js", "changed after save");
    assert_eq!(loaded.changed(None).unwrap().changed, BTreeSet::from([a]));
}

#[cfg(unix)]
#[test]
fn test_real_path_canonicalization() {
    let repo = create_test_repo(&[("real/a.js", "one")]);
    std::os::unix::fs::symlink(repo.path().join("real"), repo.path().join("link")).unwrap();

    let canonicalizer = Canonicalizer::new(CanonicalMode::RealPath);
    let mut graph = DependencyGraph::new(canonicalizer);
    let key = graph.upsert(&repo.path().join("link/a.js"), NodeUpdate::entry());

    assert!(graph.has(&repo.path().join("real/a.js")));
    assert_eq!(key, std::fs::canonicalize(repo.path().join("real/a.js")).unwrap());

    // Paths that do not exist keep their input form
    let missing = repo.path().join("link/none.js");
    assert_eq!(canonicalizer.canonical_or_input(&missing), missing);
    assert!(canonicalizer.canonicalize(&missing).is_err());
}
