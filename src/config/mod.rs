//! Configuration module for the repocache service.
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::{BatchPolicy, RegistryConfig, SweepScope};
use crate::error::ConfigError;

const DEFAULT_LOG_FILTER: &str = "repocache=info";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,

    /// How often the registry runs a freshness sweep.
    pub sweep_interval: Duration,

    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(filter) = lookup("REPOCACHE_LOG").filter(|s| !s.trim().is_empty()) {
            config.log_filter = filter;
        }

        if let Some(raw) = lookup("REPOCACHE_SWEEP_INTERVAL_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "REPOCACHE_SWEEP_INTERVAL_SECS",
                    value: raw.clone(),
                    expected: "a positive number of seconds",
                })?;
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("REPOCACHE_BATCH_POLICY") {
            let policy = raw.parse::<BatchPolicy>().map_err(|_| ConfigError::InvalidValue {
                key: "REPOCACHE_BATCH_POLICY",
                value: raw.clone(),
                expected: "collect | fail_fast",
            })?;
            config.registry = config.registry.batch_policy(policy);
        }

        if let Some(raw) = lookup("REPOCACHE_SWEEP_SCOPE") {
            let scope = raw.parse::<SweepScope>().map_err(|_| ConfigError::InvalidValue {
                key: "REPOCACHE_SWEEP_SCOPE",
                value: raw.clone(),
                expected: "all | constructed",
            })?;
            config.registry = config.registry.sweep_scope(scope);
        }

        Ok(config)
    }
}
