//! Configuration management for the hookrelay service.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use hookrelay_core::Namespace;
use hookrelay_delivery::{client::ClientConfig, ManagerConfig, RetrySchedule};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "hookrelay.toml";
const ENV_PREFIX: &str = "HOOKRELAY_";

/// Which key-value store backs notifications, webhooks and execution units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; all state is lost on exit.
    Memory,
    /// PostgreSQL table addressed by `database_url`.
    Postgres,
}

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`hookrelay.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Every field can be set through an environment variable with the
/// `HOOKRELAY_` prefix, e.g. `HOOKRELAY_WORKER_COUNT=8`. `DATABASE_URL`,
/// `STORE_BACKEND` and `RUST_LOG` are also read without the prefix.
///
/// # Example
///
/// ```no_run
/// use hookrelay::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("Polling every {}s", config.poll_interval_seconds);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Engine
    /// Seconds between the end of one dispatch cycle and the start of the
    /// next.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Store partition this instance reads and writes.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Backoff delay in seconds before attempt 1, 2, ... N. The length of the
    /// list is the number of failed attempts after which a unit is exhausted.
    #[serde(default = "default_retry_schedule")]
    pub retry_schedule_seconds: Vec<u64>,
    /// Remove exhausted units instead of keeping them as failed records.
    #[serde(default)]
    pub delete_on_exhaustion: bool,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Whole-request timeout for webhook delivery in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// Seconds to wait for workers to finish during shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    // Store
    /// Backing store selection.
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,
    /// PostgreSQL connection URL, used when `store_backend` is `postgres`.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    // Logging
    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed or the merged configuration
    /// fails validation.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered configuration sources, lowest priority first.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(&["database_url", "store_backend", "rust_log"]))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Extracts and validates a configuration from `figment`.
    ///
    /// # Errors
    ///
    /// Returns error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the delivery crate's manager configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the retry schedule is empty.
    pub fn to_manager_config(&self) -> Result<ManagerConfig> {
        Ok(ManagerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            namespace: Namespace::new(self.namespace.clone()),
            retry_schedule: self.to_retry_schedule()?,
            delete_on_exhaustion: self.delete_on_exhaustion,
            worker_count: self.worker_count,
            client: self.to_client_config(),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        })
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Convert to the retry schedule.
    ///
    /// # Errors
    ///
    /// Returns error if the schedule is empty.
    pub fn to_retry_schedule(&self) -> Result<RetrySchedule> {
        RetrySchedule::from_delays(
            self.retry_schedule_seconds.iter().map(|s| Duration::from_secs(*s)).collect(),
        )
        .context("Invalid retry_schedule_seconds")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            anyhow::bail!("poll_interval_seconds must be greater than 0");
        }

        if self.namespace.is_empty() {
            anyhow::bail!("namespace must not be empty");
        }

        if self.retry_schedule_seconds.is_empty() {
            anyhow::bail!("retry_schedule_seconds must contain at least one delay");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.delivery_timeout_seconds == 0 {
            anyhow::bail!("delivery_timeout_seconds must be greater than 0");
        }

        if self.store_backend == StoreBackend::Postgres {
            if self.database_url.is_empty() {
                anyhow::bail!("database_url is required for the postgres store");
            }
            if self.database_max_connections == 0 {
                anyhow::bail!("database_max_connections must be greater than 0");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            namespace: default_namespace(),
            retry_schedule_seconds: default_retry_schedule(),
            delete_on_exhaustion: false,
            worker_count: default_worker_count(),
            delivery_timeout_seconds: default_delivery_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            store_backend: default_store_backend(),
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            rust_log: default_log_level(),
        }
    }
}

fn default_poll_interval() -> u64 {
    hookrelay_delivery::DEFAULT_POLL_INTERVAL_SECONDS
}

fn default_namespace() -> String {
    Namespace::default().as_str().to_string()
}

fn default_retry_schedule() -> Vec<u64> {
    RetrySchedule::default().delays().iter().map(Duration::as_secs).collect()
}

fn default_worker_count() -> usize {
    hookrelay_delivery::DEFAULT_WORKER_COUNT
}

fn default_delivery_timeout() -> u64 {
    hookrelay_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_database_url() -> String {
    "postgresql://localhost/hookrelay".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info,hookrelay=debug".to_string()
}
