//! reposize daemon binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use reposize_core::RepoId;
use reposize_core::config::AppConfig;
use reposize_metadata::MetadataStore;
use reposize_storage::ObjectStore;
use reposize_worker::{
    SchedulerOptions, SizeAccountant, SizeOutcome, SizeScheduler, enqueue_stale_repositories,
    spawn_stale_scan,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// reposize - incremental repository size accounting
#[derive(Parser, Debug)]
#[command(name = "reposized")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "REPOSIZE_CONFIG",
        default_value = "config/reposize.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Recompute one repository in the foreground and print the result
    Recompute {
        /// Repository id
        repo_id: RepoId,
    },
}

/// Merge defaults, the optional config file and `REPOSIZE_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("REPOSIZE_").ignore(&["config"]).split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    Ok(config)
}

async fn open_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn MetadataStore>, Arc<dyn ObjectStore>)> {
    let objects = reposize_storage::from_config(&config.storage)
        .await
        .context("failed to initialize object store")?;
    tracing::info!(backend = objects.backend_name(), "Object store initialized");

    let metadata = reposize_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    Ok((metadata, objects))
}

async fn run(config: AppConfig) -> Result<()> {
    let (metadata, objects) = open_stores(&config).await?;

    let accountant = Arc::new(SizeAccountant::new(metadata.clone(), objects));
    let scheduler = Arc::new(SizeScheduler::start(
        accountant,
        SchedulerOptions::from(&config.scheduler),
    ));

    if config.scheduler.backfill_on_start {
        let metadata = metadata.clone();
        let scheduler = scheduler.clone();
        let batch = config.scheduler.stale_scan_batch;
        // Backfill may wait on a full queue; do not hold up signal handling.
        tokio::spawn(async move {
            match enqueue_stale_repositories(metadata.as_ref(), &scheduler, batch).await {
                Ok(count) => tracing::info!(count = count, "Startup backfill queued"),
                Err(e) => tracing::warn!(error = %e, "Startup backfill failed"),
            }
        });
    } else {
        tracing::info!("Startup backfill disabled");
    }

    let scan = config.scheduler.stale_scan_interval().map(|interval| {
        spawn_stale_scan(
            metadata.clone(),
            scheduler.clone(),
            interval,
            config.scheduler.stale_scan_batch,
        )
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for in-flight jobs");

    scheduler.shutdown().await;
    if let Some(scan) = scan
        && let Err(e) = scan.await
    {
        tracing::warn!(error = %e, "Stale scan task ended abnormally");
    }

    let stats = scheduler.stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "Shutdown complete"
    );
    Ok(())
}

fn describe(outcome: &SizeOutcome) -> &'static str {
    match outcome {
        SizeOutcome::Current(_) => "already current",
        SizeOutcome::FullWalk(_) => "full walk",
        SizeOutcome::Incremental { .. } => "incremental",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("reposize v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    match args.command {
        Command::Run => run(config).await,
        Command::Recompute { repo_id } => {
            let (metadata, objects) = open_stores(&config).await?;
            let accountant = SizeAccountant::new(metadata, objects);
            let outcome = accountant
                .recompute_size(repo_id)
                .await
                .with_context(|| format!("failed to recompute repository {repo_id}"))?;
            let info = outcome.info();
            println!(
                "{repo_id}: {} bytes, {} files at {} ({})",
                info.size,
                info.file_count,
                info.head_id,
                describe(&outcome)
            );
            Ok(())
        }
    }
}
