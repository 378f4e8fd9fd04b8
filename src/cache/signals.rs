//! Change signals raised by caches and re-emitted by the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{CacheKind, Timestamp};

/// A change notification from a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    /// The cache's data was discarded or marked stale.
    Invalidated { kind: CacheKind },
    /// The cache's data was refreshed at `at`.
    Updated { kind: CacheKind, at: Timestamp },
}

impl CacheEvent {
    pub fn kind(&self) -> CacheKind {
        match self {
            Self::Invalidated { kind } | Self::Updated { kind, .. } => *kind,
        }
    }
}

/// Handle returned by [`Signals::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Observer list for [`CacheEvent`]s.
///
/// Listeners run synchronously on the emitting thread, in subscription
/// order. The list is snapshotted before delivery, so a listener may
/// subscribe or unsubscribe (itself included) while being called.
#[derive(Default)]
pub struct Signals {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every subsequent event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener.
    ///
    /// Returns `false` if `id` was not (or is no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver `event` to every current listener.
    pub fn emit(&self, event: &CacheEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signals")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
