//! Devyntra Worker
//!
//! A stateless worker that analyzes newly created projects' repositories.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Store: PostgreSQL job queue and project state store
//! - Services: Business logic (fetch, classify, generate, analysis)
//! - Scheduler: Job dequeueing and lifecycle management
//!
//! The worker pulls analysis jobs off the queue, clones each repository into
//! a scratch workspace, infers its language, asks a generative model for a
//! Dockerfile, and records progress on the project record as it goes.

mod config;
mod lease;
mod scheduler;
mod service;
mod workspace;

use anyhow::{Context, Result};
use devyntra_store::db::{self, PgPool};
use devyntra_store::{AnalysisQueue, PgAnalysisQueue, PgProjectStore, ProjectStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::JobPoller;
use crate::service::{
    AnalysisService, ArtifactGenerator, GenAiArtifactGenerator, GitFetcher, RepositoryFetcher,
    StandardAnalysisService, StateWritePolicy,
};
use crate::workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devyntra_worker=info,devyntra_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Devyntra Worker");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: worker_id={}, workspace_root={}",
        config.worker_id,
        config.workspace_root.display()
    );

    service::fetcher::check_git_available()
        .await
        .context("git must be installed to clone repositories")?;

    // Connect to the database (with retry logic)
    let pool = connect_with_retry(&config).await?;
    info!("Database connection established");

    if config.run_migrations {
        db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations applied");
    }

    tokio::fs::create_dir_all(&config.workspace_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create workspace root {}",
                config.workspace_root.display()
            )
        })?;

    // Initialize repositories and services
    let queue: Arc<dyn AnalysisQueue> =
        Arc::new(PgAnalysisQueue::new(pool.clone(), config.poll_interval));
    let store: Arc<dyn ProjectStore> = Arc::new(PgProjectStore::new(pool.clone()));
    let fetcher: Arc<dyn RepositoryFetcher> = Arc::new(
        GitFetcher::new(config.clone_timeout)
            .with_allowed_protocols(config.clone_protocols.clone()),
    );
    let generator: Arc<dyn ArtifactGenerator> = Arc::new(GenAiArtifactGenerator::new(
        config.generation_model.clone(),
        config.gemini_api_key.clone(),
        config.generation_timeout,
    ));

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; relying on the provider's default credentials");
    }

    let analysis: Arc<dyn AnalysisService> = Arc::new(StandardAnalysisService::new(
        store,
        fetcher,
        generator,
        WorkspaceManager::new(config.workspace_root.clone()),
        StateWritePolicy::with_attempts(config.state_write_attempts),
    ));

    info!("Services initialized");

    // Create job poller
    let poller = JobPoller::new(
        queue,
        analysis,
        config.max_parallel_jobs,
        config.poll_interval,
    );

    info!("Worker initialized successfully");
    info!(
        "Poll interval: {:?}, max parallel jobs: {}, model: {}",
        config.poll_interval, config.max_parallel_jobs, config.generation_model
    );

    // Start polling loop
    let result = poller.run(shutdown_signal()).await;
    if let Err(e) = &result {
        error!("Poller error: {:#}", e);
    }

    pool.close().await;
    info!("Database pool closed, worker stopped");

    result
}

/// Loads configuration from environment variables
///
/// `DATABASE_URL` is required; other unset variables fall back to defaults.
/// Values that fail to parse are an error rather than silently replaced.
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Connect to the database with retry logic and exponential backoff
///
/// This handles the case where the database may not be ready yet when the
/// worker starts (common in container environments).
async fn connect_with_retry(config: &Config) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match db::create_pool(&config.database_url, config.db_max_connections()).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!(
                        "Successfully connected to the database after {} attempt(s)",
                        attempt
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!(
                        "Failed to connect to the database after {} attempts",
                        MAX_RETRIES
                    );
                    return Err(anyhow::anyhow!("Failed to connect to the database: {}", e));
                }

                warn!(
                    "Failed to connect to the database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
