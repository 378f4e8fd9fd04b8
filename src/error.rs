//! Error types for the cache registry.

use thiserror::Error;

use crate::cache::{CacheKind, SweepReport};

/// Errors raised by a managed cache while checking or discarding its data.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error while refreshing the {kind} cache")]
    Io {
        kind: CacheKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} cache refresh failed: {message}")]
    Refresh { kind: CacheKind, message: String },

    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by [`CacheRegistry`](crate::cache::CacheRegistry) operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a cache initializer is already registered for {0}")]
    DuplicateKind(CacheKind),

    #[error("no cache initializer registered for {0}")]
    UnknownKind(CacheKind),

    #[error("cache {kind} is not a {expected}")]
    TypeMismatch {
        kind: CacheKind,
        expected: &'static str,
    },

    #[error("initializer for {expected} produced a {actual} cache")]
    KindMismatch {
        expected: CacheKind,
        actual: CacheKind,
    },

    #[error("cache registry has been torn down")]
    Closed,

    #[error(transparent)]
    Sweep(#[from] SweepFailure),

    /// Raised by the cache itself; passed through unchanged.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Outcome of a batch sweep where at least one cache failed.
///
/// Only produced under [`BatchPolicy::CollectAndContinue`](crate::cache::BatchPolicy).
#[derive(Error, Debug)]
#[error("{} cache(s) failed during sweep: {:?}", .failures.len(), .failures.iter().map(|(kind, _)| kind.as_str()).collect::<Vec<_>>())]
pub struct SweepFailure {
    /// What the sweep accomplished on the caches that did not fail.
    pub report: SweepReport,
    /// Per-kind failures, in visiting order.
    pub failures: Vec<(CacheKind, RegistryError)>,
}

impl SweepFailure {
    /// Kinds that failed, in visiting order.
    pub fn failed_kinds(&self) -> Vec<CacheKind> {
        self.failures.iter().map(|(kind, _)| *kind).collect()
    }
}

/// Invalid configuration value.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}
