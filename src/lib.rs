//! Repocache - registry of repository caches.
//!
//! Owns one cache per repository concern (branches, log, status, locks...),
//! constructs each on first use, and fans their invalidation/update signals
//! out to the rest of the application.
//!
//! ## Architecture
//!
//! - `cache` - registry, cache contract, signals, Moka-backed keyed cache
//! - `config` - environment configuration for the service binary
//! - `error` - error types

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    BatchPolicy, CacheConfig, CacheEvent, CacheKind, CacheRegistry, CacheUpdateEvent, KeyedCache,
    ManagedCache, RegistryConfig, Signals, SubscriptionId, SweepReport, SweepScope, Timestamp,
};
pub use error::{CacheError, ConfigError, RegistryError, SweepFailure};
