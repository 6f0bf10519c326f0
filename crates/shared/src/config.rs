//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger behaviour configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// How long a mutation waits for the per-user lock before giving up.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Currency used by manual-fund requests that omit one.
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Time-to-live of cached exchange rates.
    #[serde(default = "default_rate_cache_ttl")]
    pub rate_cache_ttl_secs: u64,
    /// Maximum number of cached exchange-rate pairs.
    #[serde(default = "default_rate_cache_capacity")]
    pub rate_cache_capacity: u64,
    /// Overrides the per-currency minor-unit scale when rounding exchanges.
    #[serde(default)]
    pub rounding_scale: Option<u32>,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_currency() -> String {
    "P".to_string()
}

fn default_rate_cache_ttl() -> u64 {
    60
}

fn default_rate_cache_capacity() -> u64 {
    1_024
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            default_currency: default_currency(),
            rate_cache_ttl_secs: default_rate_cache_ttl(),
            rate_cache_capacity: default_rate_cache_capacity(),
            rounding_scale: None,
        }
    }
}

impl LedgerConfig {
    /// Returns the lock wait bound as a `Duration`.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Returns the exchange-rate cache TTL as a `Duration`.
    #[must_use]
    pub const fn rate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_cache_ttl_secs)
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("COFFER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
