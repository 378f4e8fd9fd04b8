//! Keyed managed cache backed by Moka.

use std::hash::Hash;

use chrono::Utc;
use moka::sync::Cache;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{CacheConfig, CacheEvent, CacheKind, ManagedCache, Signals, Timestamp};
use crate::error::CacheError;

/// A [`ManagedCache`] holding a keyed snapshot of repository data.
///
/// [`refresh`](Self::refresh) swaps in a fresh Moka store holding the new
/// snapshot, which is trusted for [`CacheConfig::data_timeout`]. Once that elapses, `validate()`
/// invalidates the cache itself and raises `Invalidated`.
pub struct KeyedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    kind: CacheKind,
    config: CacheConfig,
    state: RwLock<State<K, V>>,
    signals: Signals,
}

/// Store, stamp and validity change together under one lock.
struct State<K, V> {
    store: Cache<K, V>,
    last_updated_at: Timestamp,
    valid: bool,
}

impl<K, V> KeyedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. It reports stale until first refreshed.
    pub fn new(kind: CacheKind, config: CacheConfig) -> Self {
        Self {
            kind,
            state: RwLock::new(State {
                store: Self::empty_store(&config),
                last_updated_at: Timestamp::default(),
                valid: false,
            }),
            config,
            signals: Signals::new(),
        }
    }

    /// Get the capacity and timeout this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a value. Returns `None` while the cache is invalid.
    pub fn get(&self, key: &K) -> Option<V> {
        let state = self.state.read();
        if !state.valid {
            return None;
        }
        state.store.get(key)
    }

    /// Check whether the cache currently holds trusted data.
    pub fn is_valid(&self) -> bool {
        self.state.read().valid
    }

    /// Replace the whole snapshot, stamped with the current time.
    ///
    /// At most [`CacheConfig::max_capacity`] entries are kept; Moka evicts
    /// the excess from a larger snapshot and the cache still reports fresh.
    pub fn refresh<I>(&self, entries: I) -> Timestamp
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.refresh_at(entries, Utc::now())
    }

    /// Replace the whole snapshot, stamped with `at`.
    ///
    /// The stored timestamp never moves backwards; the effective one is
    /// returned and carried by the `Updated` event.
    pub fn refresh_at<I>(&self, entries: I, at: Timestamp) -> Timestamp
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::empty_store(&self.config);
        let mut count: u64 = 0;
        for (key, value) in entries {
            store.insert(key, value);
            count += 1;
        }
        if count > self.config.max_capacity {
            warn!(
                kind = %self.kind,
                entries = count,
                max_capacity = self.config.max_capacity,
                "Snapshot exceeds cache capacity, excess entries will be evicted"
            );
        }

        let (stamped, previous) = {
            let mut state = self.state.write();
            let previous = std::mem::replace(&mut state.store, store);
            state.last_updated_at = state.last_updated_at.max(at);
            state.valid = true;
            (state.last_updated_at, previous)
        };
        drop(previous);

        debug!(kind = %self.kind, at = %stamped, "Cache refreshed");
        self.signals.emit(&CacheEvent::Updated {
            kind: self.kind,
            at: stamped,
        });
        stamped
    }

    fn timed_out(&self, last: Timestamp) -> bool {
        match Utc::now().signed_duration_since(last).to_std() {
            Ok(age) => age > self.config.data_timeout,
            // Stamped in the future: still fresh.
            Err(_) => false,
        }
    }

    /// Drop the data. Returns whether the cache was valid before.
    fn discard(&self, state: &mut State<K, V>) -> bool {
        let was_valid = state.valid;
        state.valid = false;
        state.store = Self::empty_store(&self.config);
        was_valid
    }

    fn empty_store(config: &CacheConfig) -> Cache<K, V> {
        Cache::builder().max_capacity(config.max_capacity).build()
    }
}

impl<K, V> ManagedCache for KeyedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn last_updated_at(&self) -> Timestamp {
        self.state.read().last_updated_at
    }

    fn validate(&self) -> Result<bool, CacheError> {
        {
            let state = self.state.read();
            if !state.valid {
                return Ok(true);
            }
            if !self.timed_out(state.last_updated_at) {
                return Ok(false);
            }
        }

        // Check again under the write lock: a refresh may have landed since.
        let discarded = {
            let mut state = self.state.write();
            if state.valid && !self.timed_out(state.last_updated_at) {
                return Ok(false);
            }
            self.discard(&mut state)
        };

        // Only the caller that flips the flag raises the signal.
        if discarded {
            debug!(kind = %self.kind, "Cache data timed out");
            self.signals.emit(&CacheEvent::Invalidated { kind: self.kind });
        }
        Ok(true)
    }

    fn invalidate(&self) -> Result<(), CacheError> {
        self.discard(&mut self.state.write());
        self.signals.emit(&CacheEvent::Invalidated { kind: self.kind });
        Ok(())
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }
}

impl<K, V> std::fmt::Debug for KeyedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("KeyedCache")
            .field("kind", &self.kind)
            .field("valid", &state.valid)
            .field("last_updated_at", &state.last_updated_at)
            .field("entry_count", &state.store.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn recorded(cache: &KeyedCache<String, u32>) -> Arc<Mutex<Vec<CacheEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        cache.signals().subscribe(move |event| sink.lock().push(*event));
        events
    }

    #[test]
    fn test_new_cache_is_stale_without_signal() {
        let cache = KeyedCache::<String, u32>::new(CacheKind::Branches, CacheConfig::default());
        let events = recorded(&cache);

        assert!(cache.validate().unwrap());
        assert!(events.lock().is_empty());
        assert_eq!(cache.get(&"main".to_string()), None);
    }

    #[test]
    fn test_refresh_emits_updated() {
        let cache = KeyedCache::new(CacheKind::Branches, CacheConfig::default());
        let events = recorded(&cache);

        let at = cache.refresh([("main".to_string(), 1), ("dev".to_string(), 2)]);

        assert!(!cache.validate().unwrap());
        assert_eq!(cache.get(&"dev".to_string()), Some(2));
        assert_eq!(cache.last_updated_at(), at);
        assert_eq!(
            *events.lock(),
            vec![CacheEvent::Updated {
                kind: CacheKind::Branches,
                at
            }]
        );
    }

    #[test]
    fn test_timed_out_data_invalidates_itself_once() {
        let config = CacheConfig::default().data_timeout(Duration::ZERO);
        let cache = KeyedCache::new(CacheKind::GitStatus, config);
        let events = recorded(&cache);

        let past = Utc::now() - chrono::Duration::seconds(5);
        cache.refresh_at([("src/lib.rs".to_string(), 1)], past);

        assert!(cache.validate().unwrap());
        assert!(cache.validate().unwrap());

        let invalidations = events
            .lock()
            .iter()
            .filter(|event| matches!(event, CacheEvent::Invalidated { .. }))
            .count();
        assert_eq!(invalidations, 1);
        assert_eq!(cache.get(&"src/lib.rs".to_string()), None);
    }

    #[test]
    fn test_timestamp_never_moves_backwards() {
        let cache = KeyedCache::<String, u32>::new(CacheKind::GitLog, CacheConfig::default());
        let now = Utc::now();

        cache.refresh_at(Vec::new(), now);
        let stamped = cache.refresh_at(Vec::new(), now - chrono::Duration::seconds(30));

        assert_eq!(stamped, now);
        assert_eq!(cache.last_updated_at(), now);
    }

    #[test]
    fn test_invalidate_always_signals() {
        let cache = KeyedCache::new(CacheKind::GitLocks, CacheConfig::default());
        let events = recorded(&cache);
        cache.refresh([("lfs/file.bin".to_string(), 7)]);

        cache.invalidate().unwrap();

        assert!(!cache.is_valid());
        assert_eq!(cache.get(&"lfs/file.bin".to_string()), None);
        assert_eq!(
            events.lock().last(),
            Some(&CacheEvent::Invalidated { kind: CacheKind::GitLocks })
        );
    }

    #[test]
    fn test_refresh_racing_invalidate_never_leaves_fresh_but_empty() {
        for _ in 0..2_000 {
            let cache = KeyedCache::new(CacheKind::Branches, CacheConfig::default());
            let barrier = Barrier::new(2);

            thread::scope(|s| {
                s.spawn(|| {
                    barrier.wait();
                    cache.refresh([("main".to_string(), 1)]);
                });
                s.spawn(|| {
                    barrier.wait();
                    cache.invalidate().unwrap();
                });
            });

            let stale = cache.validate().unwrap();
            let value = cache.get(&"main".to_string());
            if stale {
                assert_eq!(value, None);
            } else {
                assert_eq!(value, Some(1));
            }
        }
    }

    #[test]
    fn test_refresh_landing_before_timeout_discard_is_kept() {
        let config = CacheConfig::default().data_timeout(Duration::from_secs(60));
        let cache = KeyedCache::new(CacheKind::GitStatus, config);
        let events = recorded(&cache);

        let past = Utc::now() - chrono::Duration::seconds(120);
        cache.refresh_at([("old".to_string(), 1)], past);

        let barrier = Barrier::new(2);
        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                cache.validate().unwrap();
            });
            s.spawn(|| {
                barrier.wait();
                cache.refresh([("new".to_string(), 2)]);
            });
        });

        // Whichever order they ran in, a completed refresh is never thrown away.
        let refreshed_last = matches!(events.lock().last(), Some(CacheEvent::Updated { .. }));
        if refreshed_last {
            assert!(!cache.validate().unwrap());
            assert_eq!(cache.get(&"new".to_string()), Some(2));
        }
        assert_eq!(cache.get(&"old".to_string()), None);
    }

    #[test]
    fn test_oversized_snapshot_is_bounded_by_capacity() {
        let config = CacheConfig::default().max_capacity(2);
        let cache = KeyedCache::new(CacheKind::GitLog, config);

        cache.refresh((0..10).map(|i| (format!("commit-{i}"), i)));

        assert!(cache.is_valid());
        let state = cache.state.read();
        state.store.run_pending_tasks();
        assert!(state.store.entry_count() <= 2);
    }
}
