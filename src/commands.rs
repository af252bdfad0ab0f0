//! CLI command implementations

use ripple_engine::{Affected, DependencyTree, EngineConfig};
use ripple_resolver::StaticResolver;
use ripple_watcher::WatcherService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

async fn open(config: EngineConfig) -> anyhow::Result<DependencyTree> {
    if config.entry_files.is_empty() {
        tracing::warn!("No entry files configured; pass --entry or set entry_files in ripple.toml");
    }
    Ok(DependencyTree::open(config, Arc::new(StaticResolver::new())).await?)
}

pub async fn hydrate(config: EngineConfig) -> anyhow::Result<()> {
    let tree = open(config).await?;
    let graph = tree.graph();
    let missing = graph.nodes().filter(|n| n.attributes.missing).count();

    println!(
        "{} files, {} edges, {} entry files, {} missing",
        graph.node_count(),
        graph.edge_count(),
        tree.entry_files().len(),
        missing
    );
    tree.shutdown().await?;
    Ok(())
}

pub async fn affected(
    config: EngineConfig,
    paths: Vec<PathBuf>,
    all: bool,
    json: bool,
) -> anyhow::Result<()> {
    let known_changed: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| if p.is_absolute() { p } else { config.cwd.join(p) })
        .collect();

    let mut tree = open(config).await?;
    let affected = tree.affected(&known_changed).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&affected)?);
    } else {
        print_affected(&affected, all);
    }
    tree.shutdown().await?;
    Ok(())
}

pub async fn watch(config: EngineConfig, debounce_ms: u64) -> anyhow::Result<()> {
    let tree = open(config).await?;
    let mut service = WatcherService::new(tree)?.with_debounce(Duration::from_millis(debounce_ms));
    service.start_watching()?;

    tokio::select! {
        result = service.process_events(|affected| print_affected(affected, false)) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Stopping watcher"),
    }

    service.into_tree().shutdown().await?;
    Ok(())
}

pub async fn prune(config: EngineConfig) -> anyhow::Result<()> {
    let mut tree = open(config).await?;
    let report = tree.prune().await?;

    for path in &report.removed {
        println!("{}", path.display());
    }
    tracing::info!("Removed {} files", report.removed.len());
    tree.shutdown().await?;
    Ok(())
}

pub async fn clear(config: EngineConfig) -> anyhow::Result<()> {
    let cache_dir = config.cache_dir();
    tracing::info!("Clearing cache: {}", cache_dir.display());

    ripple_core::clear_cache(&cache_dir).await?;

    tracing::info!("Cache cleared");
    Ok(())
}

fn print_affected(affected: &Affected, all: bool) {
    for path in &affected.affected_entry_files {
        println!("{}", path.display());
    }
    if all {
        for path in affected
            .affected_files
            .difference(&affected.affected_entry_files)
        {
            println!("  {}", path.display());
        }
    }
}
