//! Cache module - registry of lazily constructed repository caches.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - owns one cache per [`CacheKind`], built on first use,
//!   and re-emits every cache's signals to its own subscribers
//! - `ManagedCache` - the contract each cache implements
//! - `Signals` - observer list used by caches and by the registry
//! - `KeyedCache` - Moka-backed `ManagedCache` with timeout-based staleness
//!
//! ## Usage
//!
//! ```rust
//! use repocache::{CacheConfig, CacheKind, CacheRegistry, KeyedCache};
//!
//! let registry = CacheRegistry::new();
//! registry
//!     .register(CacheKind::GitStatus, || {
//!         Ok(KeyedCache::<String, String>::new(
//!             CacheKind::GitStatus,
//!             CacheConfig::for_kind(CacheKind::GitStatus),
//!         ))
//!     })
//!     .unwrap();
//!
//! registry.on_invalidated(|kind| println!("{kind} needs a refresh"));
//!
//! // Stale caches are invalidated; fresh ones are left alone.
//! let report = registry.invalidate_all().unwrap();
//! assert_eq!(report.stale, vec![CacheKind::GitStatus]);
//! ```

mod config;
mod keyed;
mod kind;
mod managed;
mod registry;
mod signals;

pub use config::{BatchPolicy, CacheConfig, RegistryConfig, SweepScope};
pub use keyed::KeyedCache;
pub use kind::CacheKind;
pub use managed::{AsAny, CacheUpdateEvent, ManagedCache, Timestamp};
pub use registry::{CacheRegistry, SweepReport};
pub use signals::{CacheEvent, Signals, SubscriptionId};
