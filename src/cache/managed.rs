//! The capability contract every registry-managed cache implements.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CacheKind, Signals};
use crate::error::CacheError;

/// Moment of a cache's last successful data refresh.
pub type Timestamp = DateTime<Utc>;

/// A cache owned by a [`CacheRegistry`](super::CacheRegistry).
///
/// Implementors raise [`CacheEvent`](super::CacheEvent)s through the
/// [`Signals`] they expose; the registry subscribes to them once, when the
/// cache is first constructed.
pub trait ManagedCache: AsAny + Send + Sync {
    /// Immutable for the lifetime of the cache.
    fn kind(&self) -> CacheKind;

    /// Non-decreasing under normal operation.
    fn last_updated_at(&self) -> Timestamp;

    /// Check freshness. Returns `Ok(true)` when the data is stale.
    ///
    /// A cache may invalidate itself here (and raise `Invalidated`) as
    /// part of its own policy.
    fn validate(&self) -> Result<bool, CacheError>;

    /// Discard the cached data and raise `Invalidated`.
    fn invalidate(&self) -> Result<(), CacheError>;

    fn signals(&self) -> &Signals;
}

/// Upcast to `Any` so a type-erased cache can be narrowed back to its
/// concrete type.
pub trait AsAny {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An out-of-band claim that a cache's backing data changed at `updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUpdateEvent {
    pub kind: CacheKind,
    pub updated_at: Timestamp,
}

impl CacheUpdateEvent {
    pub fn new(kind: CacheKind, updated_at: Timestamp) -> Self {
        Self { kind, updated_at }
    }
}
