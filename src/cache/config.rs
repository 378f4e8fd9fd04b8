//! Registry and per-cache configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::CacheKind;
use crate::error::ConfigError;

/// How batch operations react when one cache fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Visit every cache, then report all failures together.
    #[default]
    CollectAndContinue,
    /// Stop at the first failure and return its error unchanged.
    FailFast,
}

impl FromStr for BatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "collect" | "collect_and_continue" => Ok(Self::CollectAndContinue),
            "fail_fast" | "failfast" => Ok(Self::FailFast),
            _ => Err(ConfigError::InvalidValue {
                key: "batch policy",
                value: s.to_string(),
                expected: "collect | fail_fast",
            }),
        }
    }
}

/// Which entries batch operations visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepScope {
    /// Construct every registered cache that has not been looked up yet.
    #[default]
    AllRegistered,
    /// Only visit caches that were already constructed.
    ConstructedOnly,
}

impl FromStr for SweepScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "all_registered" => Ok(Self::AllRegistered),
            "constructed" | "constructed_only" => Ok(Self::ConstructedOnly),
            _ => Err(ConfigError::InvalidValue {
                key: "sweep scope",
                value: s.to_string(),
                expected: "all | constructed",
            }),
        }
    }
}

/// Configuration for a [`CacheRegistry`](super::CacheRegistry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub batch_policy: BatchPolicy,
    pub sweep_scope: SweepScope,
}

impl RegistryConfig {
    #[must_use]
    pub fn batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.batch_policy = policy;
        self
    }

    #[must_use]
    pub fn sweep_scope(mut self, scope: SweepScope) -> Self {
        self.sweep_scope = scope;
        self
    }
}

/// Configuration for a [`KeyedCache`](super::KeyedCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// How long refreshed data is trusted before `validate()` reports it stale.
    pub data_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            data_timeout: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with the given max capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    #[must_use]
    pub fn data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    /// Defaults tuned to how quickly each kind of repository data goes stale.
    ///
    /// Working tree state changes constantly, identity and repository
    /// metadata almost never.
    pub fn for_kind(kind: CacheKind) -> Self {
        match kind {
            CacheKind::GitStatus | CacheKind::GitAheadBehind => Self {
                max_capacity: 50_000,
                data_timeout: Duration::from_secs(10),
            },
            CacheKind::GitLocks => Self::default().data_timeout(Duration::from_secs(30)),
            CacheKind::Branches | CacheKind::GitLog => Self::default(),
            CacheKind::GitUser | CacheKind::RepositoryInfo => Self {
                max_capacity: 100,
                data_timeout: Duration::from_secs(600),
            },
        }
    }
}
