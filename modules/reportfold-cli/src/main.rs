//! Management commands for the report clustering engine.
//!
//! The engine has no internal scheduler: an external one triggers
//! `cluster-reports` (full re-cluster) or `triage-new-reports`
//! (incremental) as discrete batch jobs. Retry policy lives with the
//! scheduler; a failed run is recorded on its ClusteringJob row before the
//! error propagates.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reportfold_core::{file_config, AppConfig, Embedder, FileConfig, ServerDeps};
use reportfold_domains::{run_full_clustering, run_triage, RunOutcome};

#[derive(Parser)]
#[command(name = "reportfold", about = "Report deduplication and triage engine")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config/reportfold.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cluster similar reports within domains and create buckets for each
    /// cluster.
    ClusterReports {
        /// Cluster reports for a specific domain only.
        #[arg(long)]
        domain: Option<String>,
    },
    /// Assign unbucketed reports into existing buckets, clustering or
    /// domain-bucketing whatever doesn't match.
    TriageNewReports,
    /// Run pending database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    let file_config = Arc::new(file_config::load_config(&cli.config)?);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    let outcome = match cli.command {
        Command::Migrate => {
            sqlx::migrate!("../../migrations").run(&pool).await?;
            info!("Migrations applied");
            return Ok(());
        }
        Command::ClusterReports { domain } => {
            let deps = build_deps(pool, config, file_config);
            run_full_clustering(&deps, domain.as_deref()).await?
        }
        Command::TriageNewReports => {
            let deps = build_deps(pool, config, file_config);
            run_triage(&deps).await?
        }
    };

    match outcome {
        RunOutcome {
            skipped: Some(reason),
            ..
        } => info!("Run skipped: {}", reason.describe()),
        RunOutcome {
            job_id,
            buckets_created,
            ..
        } => info!(
            job_id = ?job_id,
            buckets_created,
            "Run completed"
        ),
    }

    Ok(())
}

fn build_deps(pool: PgPool, config: AppConfig, file_config: Arc<FileConfig>) -> ServerDeps {
    let mut embedder = Embedder::new(&config.openai_api_key, &file_config.models.embedding);
    if let Some(ref base_url) = config.embedding_base_url {
        embedder = embedder.with_base_url(base_url);
    }

    ServerDeps::new(pool, Arc::new(embedder), config, file_config)
}
