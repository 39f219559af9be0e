//! Hookrelay webhook fan-out service.
//!
//! Main entry point. Loads configuration, opens the backing store and runs
//! the webhook manager until Ctrl-C or SIGTERM, then shuts down gracefully.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hookrelay::{Config, StoreBackend};
use hookrelay_core::{
    storage::{KvStore, MemoryStore, PostgresStore},
    NoOpHooks, RealClock,
};
use hookrelay_delivery::WebhookManager;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!(
        store_backend = ?config.store_backend,
        namespace = %config.namespace,
        worker_count = config.worker_count,
        poll_interval_seconds = config.poll_interval_seconds,
        "Starting hookrelay"
    );

    let store = open_store(&config).await?;
    let manager_config = config.to_manager_config()?;
    let mut manager = WebhookManager::new(
        store,
        manager_config,
        Arc::new(RealClock::new()),
        Arc::new(NoOpHooks::new()),
    )
    .context("Failed to create webhook manager")?;

    manager.start().await.context("Failed to start webhook manager")?;
    info!("Hookrelay is delivering webhooks");

    shutdown_signal().await?;
    info!("Shutdown signal received, starting graceful shutdown");

    let stats = manager.stats().await;
    manager.shutdown().await.context("Webhook manager did not shut down cleanly")?;

    info!(
        delivered = stats.delivered,
        failed_attempts = stats.failed_attempts,
        exhausted = stats.exhausted,
        "Hookrelay shutdown complete"
    );
    Ok(())
}

/// Initializes tracing with environment-based configuration.
///
/// `RUST_LOG` wins over the configured default filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Opens the configured key-value store.
async fn open_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store, pending deliveries are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        },
        StoreBackend::Postgres => {
            info!(database_url = %config.database_url_masked(), "Connecting to PostgreSQL");
            let pool = create_database_pool(config).await?;
            let store = PostgresStore::new(pool);
            store.ensure_schema().await.context("Failed to create store table")?;
            info!("PostgreSQL store ready");
            Ok(Arc::new(store))
        },
    }
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                PostgresStore::new(pool.clone())
                    .health_check()
                    .await
                    .context("Failed to verify database connection")?;
                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received CTRL+C signal");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            },
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Received CTRL+C signal");
    }

    Ok(())
}
