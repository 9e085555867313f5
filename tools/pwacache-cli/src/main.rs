//! Operator CLI for the pwacache offline store.
//!
//! Provides commands for:
//! - Validating a worker configuration
//! - Inspecting a persisted SQLite store
//! - Running generation GC outside the worker
//! - Precaching a manifest from a live origin
//!
//! ## Usage
//!
//! ```bash
//! # Check a config file and print it with defaults filled in
//! pwacache validate worker.json
//!
//! # List caches and entry counts
//! pwacache list --db cache.sqlite
//!
//! # Drop every cache outside the configured generation
//! pwacache gc --db cache.sqlite --config worker.json
//!
//! # Fill static-<tag> from a running server
//! pwacache precache --db cache.sqlite --config worker.json --origin http://localhost:8000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pwacache_common::{init_logging, LogConfig, LogFormat};
use pwacache_core::WorkerConfig;
use pwacache_sw::{
    CacheBackend, CacheGeneration, CacheKind, CacheStore, HttpFetcher, PrecacheLoader,
    SqliteBackend,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use url::{Origin, Url};

#[derive(Parser)]
#[command(name = "pwacache")]
#[command(about = "Inspect and maintain a pwacache offline store")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a worker config and print it with defaults applied
    Validate {
        /// Config file (JSON)
        config: PathBuf,
    },

    /// Print the built-in default config
    Defaults,

    /// List persisted caches
    List {
        /// SQLite store path
        #[arg(long)]
        db: PathBuf,
        /// Config file (JSON) used to mark the current generation
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every cache outside the configured generation
    Gc {
        /// SQLite store path
        #[arg(long)]
        db: PathBuf,
        /// Config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Precache the manifest from a live origin
    Precache {
        /// SQLite store path
        #[arg(long)]
        db: PathBuf,
        /// Config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Origin serving the manifest entries
        #[arg(long)]
        origin: Url,
    },
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    name: String,
    entries: usize,
    current: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_verbosity(cli.verbose);
    if cli.json_logs {
        log_config = log_config.with_format(LogFormat::Json);
    }
    init_logging(log_config);

    match cli.command {
        Commands::Validate { config } => {
            let config = load_config(Some(&config))?;
            println!("{}", config.to_json_pretty()?);
        }

        Commands::Defaults => {
            println!("{}", WorkerConfig::default().to_json_pretty()?);
        }

        Commands::List { db, config, json } => {
            let config = load_config(config.as_deref())?;
            let generation = CacheGeneration::new(config.version.clone());
            let backend = SqliteBackend::open(&db)
                .with_context(|| format!("opening {}", db.display()))?;
            let summaries = list_caches(&backend, &generation).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No caches in {}", db.display());
            } else {
                for summary in &summaries {
                    let marker = if summary.current { "*" } else { " " };
                    println!("{} {:<32} {:>6} entries", marker, summary.name, summary.entries);
                }
            }
        }

        Commands::Gc { db, config } => {
            let config = load_config(config.as_deref())?;
            let backend = Arc::new(
                SqliteBackend::open(&db).with_context(|| format!("opening {}", db.display()))?,
            );
            let store = CacheStore::new(backend, Origin::new_opaque());
            let generation = CacheGeneration::new(config.version.clone());

            let deleted = store.collect_garbage(&generation).await?;
            for name in &deleted {
                println!("deleted {}", name);
            }
            println!(
                "Kept generation {} ({} cache(s) deleted)",
                generation.version(),
                deleted.len()
            );
        }

        Commands::Precache { db, config, origin } => {
            let config = load_config(config.as_deref())?;
            let backend = Arc::new(
                SqliteBackend::open(&db).with_context(|| format!("opening {}", db.display()))?,
            );
            let store = CacheStore::new(backend, origin.origin());
            let fetcher = Arc::new(HttpFetcher::new()?);
            let generation = CacheGeneration::new(config.version.clone());

            let target = store.open(&generation.cache_name(CacheKind::Static)).await?;
            let loader = PrecacheLoader::new(store.clone(), fetcher, config.precache.policy);
            let report = loader.run(&config.precache.manifest, &target).await?;

            for url in &report.stored {
                println!("  ok     {}", url);
            }
            for failure in &report.failed {
                println!("  FAILED {} ({})", failure.url, failure.reason);
            }
            println!(
                "Precached {}/{} into {}",
                report.stored.len(),
                report.total(),
                target.name()
            );

            if !report.is_complete() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Load a config file, or the defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<WorkerConfig> {
    match path {
        Some(path) => {
            let config = WorkerConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            info!(path = %path.display(), version = %config.version, "Config loaded");
            Ok(config)
        }
        None => Ok(WorkerConfig::default()),
    }
}

async fn list_caches(
    backend: &dyn CacheBackend,
    current: &CacheGeneration,
) -> Result<Vec<CacheSummary>> {
    let mut names = backend.names().await?;
    names.sort();

    let mut summaries = Vec::with_capacity(names.len());
    for name in names {
        let entries = backend.keys(&name).await?.len();
        summaries.push(CacheSummary {
            current: current.contains(&name),
            name,
            entries,
        });
    }
    Ok(summaries)
}
