//! Shared test doubles for registry integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use repocache::{CacheError, CacheEvent, CacheKind, CacheRegistry, ManagedCache, Signals, Timestamp};

/// Knobs and counters shared between a test and the mock it registered.
#[derive(Debug, Default)]
pub struct MockState {
    pub stale: AtomicBool,
    /// Raise `Invalidated` from `validate()` when stale.
    pub self_invalidate: AtomicBool,
    pub fail_validate: AtomicBool,
    pub last_updated_at: Mutex<Timestamp>,
    pub validate_calls: AtomicUsize,
    pub invalidate_calls: AtomicUsize,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        *state.last_updated_at.lock() = Utc::now();
        Arc::new(state)
    }

    pub fn set_stale(&self, stale: bool) {
        self.stale.store(stale, Ordering::SeqCst);
    }

    pub fn set_self_invalidate(&self, enabled: bool) {
        self.self_invalidate.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_validate(&self, fail: bool) {
        self.fail_validate.store(fail, Ordering::SeqCst);
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn invalidate_calls(&self) -> usize {
        self.invalidate_calls.load(Ordering::SeqCst)
    }
}

pub struct MockCache {
    kind: CacheKind,
    state: Arc<MockState>,
    signals: Arc<Signals>,
}

impl MockCache {
    pub fn new(kind: CacheKind, state: Arc<MockState>) -> Self {
        Self {
            kind,
            state,
            signals: Arc::new(Signals::new()),
        }
    }

    pub fn state(&self) -> &Arc<MockState> {
        &self.state
    }

    /// Handle on this cache's listener list that outlives the cache.
    pub fn shared_signals(&self) -> Arc<Signals> {
        Arc::clone(&self.signals)
    }

    /// Simulate a data refresh.
    pub fn touch(&self, at: Timestamp) {
        *self.state.last_updated_at.lock() = at;
        self.signals.emit(&CacheEvent::Updated { kind: self.kind, at });
    }

    pub fn emit_invalidated(&self) {
        self.signals.emit(&CacheEvent::Invalidated { kind: self.kind });
    }
}

impl ManagedCache for MockCache {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn last_updated_at(&self) -> Timestamp {
        *self.state.last_updated_at.lock()
    }

    fn validate(&self) -> Result<bool, CacheError> {
        self.state.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_validate.load(Ordering::SeqCst) {
            return Err(CacheError::Refresh {
                kind: self.kind,
                message: "git exited with status 128".to_string(),
            });
        }

        let stale = self.state.stale.load(Ordering::SeqCst);
        if stale && self.state.self_invalidate.load(Ordering::SeqCst) {
            self.emit_invalidated();
        }
        Ok(stale)
    }

    fn invalidate(&self) -> Result<(), CacheError> {
        self.state.invalidate_calls.fetch_add(1, Ordering::SeqCst);
        self.emit_invalidated();
        Ok(())
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }
}

/// Register a mock for `kind`, returning its state and a factory call counter.
pub fn register_mock(registry: &CacheRegistry, kind: CacheKind) -> (Arc<MockState>, Arc<AtomicUsize>) {
    let state = MockState::new();
    let builds = Arc::new(AtomicUsize::new(0));

    let factory_state = Arc::clone(&state);
    let factory_builds = Arc::clone(&builds);
    registry
        .register(kind, move || {
            factory_builds.fetch_add(1, Ordering::SeqCst);
            Ok(MockCache::new(kind, Arc::clone(&factory_state)))
        })
        .unwrap();

    (state, builds)
}

/// Record every event the registry re-emits.
pub fn record(registry: &CacheRegistry) -> Arc<Mutex<Vec<CacheEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    registry.subscribe(move |event| sink.lock().push(*event));
    events
}
