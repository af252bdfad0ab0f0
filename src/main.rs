//! Ripple CLI entry point

use clap::{Parser, Subcommand};
use ripple_core::CanonicalMode;
use ripple_engine::{EngineConfig, ResolutionMode};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "ripple")]
#[command(about = "Incremental dependency graph and affected-file analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (defaults to <root>/ripple.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Entry file, relative to the root (repeatable)
    #[arg(short, long = "entry", global = true)]
    entries: Vec<PathBuf>,

    /// Resolve dependencies on a dedicated worker thread
    #[arg(long, global = true)]
    threaded: bool,

    /// Key files by their real path, following symlinks
    #[arg(long, global = true)]
    real_path: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the dependency caches
    Hydrate,
    /// Print entry files affected by changes since the last run
    Affected {
        /// Files known to have changed
        paths: Vec<PathBuf>,

        /// Also print every affected intermediate file
        #[arg(short, long)]
        all: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch the repository and print affected entry files on every change
    Watch {
        /// Quiet period that ends a batch of changes
        #[arg(long, default_value = "200")]
        debounce_ms: u64,
    },
    /// Remove missing files nothing depends on any more
    Prune,
    /// Clear the cache
    Clear,
    /// Show version
    Version,
}

impl Cli {
    async fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let root = std::path::absolute(&self.root)?;
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path).await?,
            None => EngineConfig::discover(&root).await?,
        };
        config.entry_files.extend(self.entries.iter().cloned());
        if self.threaded {
            config.resolution = ResolutionMode::Threaded;
        }
        if self.real_path {
            config.canonical_mode = CanonicalMode::RealPath;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("ripple={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Version = cli.command {
        println!("Ripple v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = cli.engine_config().await?;
    tracing::debug!("Repository root: {}", config.cwd.display());

    match cli.command {
        Commands::Hydrate => commands::hydrate(config).await,
        Commands::Affected { paths, all, json } => {
            commands::affected(config, paths, all, json).await
        }
        Commands::Watch { debounce_ms } => commands::watch(config, debounce_ms).await,
        Commands::Prune => commands::prune(config).await,
        Commands::Clear => commands::clear(config).await,
        Commands::Version => Ok(()),
    }
}
