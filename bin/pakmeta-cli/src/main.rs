//! pakmeta – fetch catalog metadata for packages from the command line.
//!
//! Startup order:
//! 1. Parse logging configuration from environment variables.
//! 2. Initialise tracing (JSON when `PAKMETA_LOG_JSON` is set).
//! 3. Build the enrichment context from `PAKMETA_*` variables and flags.
//! 4. Run the requested subcommand.

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pakmeta_core::{CatalogContext, EnrichConfig, PackageRecord, PoolError, RawPackage};
use tracing::{info, warn};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "pakmeta")]
#[command(about = "Fetch remote catalog metadata for packages")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    enrich: EnrichArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values otherwise read from `PAKMETA_*` variables.
#[derive(Args)]
struct EnrichArgs {
    /// Remote catalog origin
    #[arg(long, global = true)]
    catalog_url: Option<String>,

    /// Cache time-to-live in seconds (0 disables, negative never expires)
    #[arg(long, global = true, allow_hyphen_values = true)]
    cache_ttl: Option<i64>,

    /// GET attempts per package
    #[arg(long, global = true)]
    attempts: Option<u32>,

    /// Records queued per worker before another worker is started
    #[arg(long, global = true)]
    worker_load: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich the given package ids and print them as JSON
    Enrich {
        /// Package ids, e.g. org.gimp.GIMP
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Download the full catalog listing and report its size
    Catalog,
}

impl EnrichArgs {
    fn apply(self, mut config: EnrichConfig) -> EnrichConfig {
        if let Some(url) = self.catalog_url {
            config = config.with_catalog_base_url(url);
        }
        if let Some(ttl) = self.cache_ttl {
            config = config.with_cache_ttl_secs(ttl);
        }
        if let Some(attempts) = self.attempts {
            config = config.with_fetch_attempts(attempts);
        }
        if let Some(load) = self.worker_load {
            config = config.with_max_load_per_worker(load);
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: PAKMETA_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "pakmeta starting");

    // ── 3. Enrichment context ──────────────────────────────────────────────────
    let enrich_config = cli.enrich.apply(EnrichConfig::from_env());
    let ctx = Arc::new(
        CatalogContext::new(enrich_config).context("failed to set up the enrichment context")?,
    );

    // ── 4. Command ─────────────────────────────────────────────────────────────
    match cli.command {
        Commands::Enrich { ids } => enrich(&ctx, ids),
        Commands::Catalog => {
            let stored = ctx
                .refresh_catalog_data()
                .context("failed to download the catalog")?;
            println!("{stored}");
            Ok(())
        }
    }
}

fn enrich(ctx: &CatalogContext, ids: Vec<String>) -> anyhow::Result<()> {
    let pool = ctx.pool();
    let records: Vec<_> = ids
        .into_iter()
        .map(|id| PackageRecord::new_handle(RawPackage::new(id)))
        .collect();

    for record in &records {
        match pool.enqueue(Arc::clone(record)) {
            Ok(_) => {}
            Err(PoolError::Saturated { .. }) => {
                // Let the current batch finish, then start over with fresh workers.
                pool.shutdown();
                pool.enqueue(Arc::clone(record))
                    .with_context(|| format!("failed to queue {}", record.id()))?;
            }
            Err(e) => return Err(e).with_context(|| format!("failed to queue {}", record.id())),
        }
    }
    pool.shutdown();

    let views: Vec<_> = records.iter().map(|r| r.snapshot()).collect();
    let incomplete = records.iter().filter(|r| r.is_incomplete()).count();
    if incomplete > 0 {
        warn!(incomplete, total = records.len(), "some packages have no catalog data");
    }

    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}
