//! Cache registry - lazy construction and event fan-out for all caches.

use std::any::type_name;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::{
    AsAny, BatchPolicy, CacheEvent, CacheKind, CacheUpdateEvent, ManagedCache, RegistryConfig, Signals,
    SubscriptionId, SweepScope, Timestamp,
};
use crate::error::{CacheError, RegistryError, SweepFailure};

type Factory = Box<dyn Fn() -> Result<Arc<dyn ManagedCache>, CacheError> + Send + Sync>;

/// What a batch operation did, per kind, in visiting order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Caches whose `validate()` completed.
    pub checked: Vec<CacheKind>,
    /// Caches that reported stale data.
    pub stale: Vec<CacheKind>,
    /// Caches the registry forced to invalidate.
    pub invalidated: Vec<CacheKind>,
    /// Stale caches that invalidated themselves during `validate()`.
    pub self_invalidated: Vec<CacheKind>,
    /// Registered but never constructed ([`SweepScope::ConstructedOnly`]).
    pub skipped: Vec<CacheKind>,
}

/// Central registry for the repository caches.
///
/// Each [`CacheKind`] gets one initializer. The cache itself is built on
/// first lookup, exactly once, and the registry subscribes to its signals
/// before handing it out. Every `Invalidated`/`Updated` the cache raises is
/// re-emitted, unchanged, to the registry's own subscribers.
///
/// ## Example
///
/// ```rust
/// use repocache::{CacheConfig, CacheKind, CacheRegistry, KeyedCache};
///
/// let registry = CacheRegistry::new();
/// registry
///     .register(CacheKind::Branches, || {
///         Ok(KeyedCache::<String, String>::new(CacheKind::Branches, CacheConfig::default()))
///     })
///     .unwrap();
///
/// registry.on_updated(|kind, at| println!("{kind} refreshed at {at}"));
///
/// let branches = registry.branch_cache::<KeyedCache<String, String>>().unwrap();
/// branches.refresh([("main".to_string(), "4f2a9c1".to_string())]);
/// ```
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: RegistryConfig,
    entries: RwLock<Vec<Arc<RegistryEntry>>>,
    events: Signals,
    closed: AtomicBool,
}

/// One registered kind. Construction is guarded by the entry's own cell,
/// so lookups of different kinds never wait on each other.
struct RegistryEntry {
    kind: CacheKind,
    factory: Factory,
    slot: OnceCell<Attached>,
    detached: AtomicBool,
    /// `Invalidated` signals seen from this cache.
    invalidations: Arc<AtomicU64>,
}

struct Attached {
    cache: Arc<dyn ManagedCache>,
    subscription: SubscriptionId,
}

impl RegistryEntry {
    fn new(kind: CacheKind, factory: Factory) -> Self {
        Self {
            kind,
            factory,
            slot: OnceCell::new(),
            detached: AtomicBool::new(false),
            invalidations: Arc::new(AtomicU64::new(0)),
        }
    }

    fn constructed(&self) -> Option<Arc<dyn ManagedCache>> {
        self.slot.get().map(|attached| Arc::clone(&attached.cache))
    }

    fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Build and subscribe on first call. A failed build leaves the entry
    /// empty so a later call can retry.
    fn attach(&self, hub: Weak<RegistryInner>) -> Result<Arc<dyn ManagedCache>, RegistryError> {
        let attached = self.slot.get_or_try_init(|| -> Result<Attached, RegistryError> {
            let cache = (self.factory)()?;

            let actual = cache.kind();
            if actual != self.kind {
                return Err(RegistryError::KindMismatch {
                    expected: self.kind,
                    actual,
                });
            }

            let counter = Arc::clone(&self.invalidations);
            let subscription = cache.signals().subscribe(move |event| {
                if matches!(event, CacheEvent::Invalidated { .. }) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(inner) = hub.upgrade() {
                    inner.forward(event);
                }
            });

            debug!(kind = %self.kind, "Constructed cache");
            Ok(Attached {
                cache,
                subscription,
            })
        })?;

        Ok(Arc::clone(&attached.cache))
    }

    fn detach(&self) {
        if let Some(attached) = self.slot.get() {
            if !self.detached.swap(true, Ordering::AcqRel) {
                attached.cache.signals().unsubscribe(attached.subscription);
            }
        }
    }
}

impl RegistryInner {
    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        Ok(())
    }

    fn entry(&self, kind: CacheKind) -> Result<Arc<RegistryEntry>, RegistryError> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.kind == kind)
            .cloned()
            .ok_or(RegistryError::UnknownKind(kind))
    }

    fn attach(
        self: &Arc<Self>,
        entry: &RegistryEntry,
    ) -> Result<Arc<dyn ManagedCache>, RegistryError> {
        let cache = entry.attach(Arc::downgrade(self))?;

        // Teardown sets `closed` before taking the write lock, so reading it
        // under the read lock sees either the flag or our filled slot.
        let closed = {
            let _entries = self.entries.read();
            self.closed.load(Ordering::Acquire)
        };

        // Lost a race with teardown: undo our subscription.
        if closed {
            entry.detach();
            return Err(RegistryError::Closed);
        }
        Ok(cache)
    }

    fn forward(&self, event: &CacheEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match event {
            CacheEvent::Invalidated { kind } => trace!(%kind, "Forwarding cache invalidation"),
            CacheEvent::Updated { kind, at } => trace!(%kind, %at, "Forwarding cache update"),
        }
        self.events.emit(event);
    }

    fn teardown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let entries = std::mem::take(&mut *self.entries.write());
        let mut detached = 0;
        for entry in &entries {
            if entry.slot.get().is_some() {
                entry.detach();
                detached += 1;
            }
        }
        self.events.clear();

        info!(
            registered = entries.len(),
            detached, "Cache registry torn down"
        );
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl CacheRegistry {
    /// Create a new empty cache registry.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty cache registry with the given sweep settings.
    pub fn with_config(config: RegistryConfig) -> Self {
        info!(?config, "Cache registry initialized");
        Self {
            inner: Arc::new(RegistryInner {
                config,
                entries: RwLock::new(Vec::new()),
                events: Signals::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the sweep settings this registry was created with.
    pub fn config(&self) -> RegistryConfig {
        self.inner.config
    }

    /// Register the initializer for `kind`. It is not called until the
    /// first lookup.
    ///
    /// Fails with [`RegistryError::DuplicateKind`] if `kind` already has
    /// one; the existing registration is kept.
    pub fn register<C, F>(&self, kind: CacheKind, factory: F) -> Result<(), RegistryError>
    where
        C: ManagedCache + 'static,
        F: Fn() -> Result<C, CacheError> + Send + Sync + 'static,
    {
        let mut entries = self.inner.entries.write();
        self.inner.ensure_open()?;

        if entries.iter().any(|entry| entry.kind == kind) {
            return Err(RegistryError::DuplicateKind(kind));
        }

        let factory: Factory =
            Box::new(move || factory().map(|cache| Arc::new(cache) as Arc<dyn ManagedCache>));
        entries.push(Arc::new(RegistryEntry::new(kind, factory)));

        debug!(%kind, "Registered cache initializer");
        Ok(())
    }

    /// Get the cache for `kind`, constructing it on first call.
    ///
    /// Concurrent first calls for the same kind run the initializer once;
    /// all of them receive the same instance.
    pub fn get(&self, kind: CacheKind) -> Result<Arc<dyn ManagedCache>, RegistryError> {
        self.inner.ensure_open()?;
        let entry = self.inner.entry(kind)?;
        self.inner.attach(&entry)
    }

    /// Get the cache for `kind` as its concrete type.
    ///
    /// Fails with [`RegistryError::TypeMismatch`] if the registered
    /// initializer produces some other type.
    pub fn get_as<C: ManagedCache + 'static>(&self, kind: CacheKind) -> Result<Arc<C>, RegistryError> {
        self.get(kind)?
            .into_any_arc()
            .downcast::<C>()
            .map_err(|_| RegistryError::TypeMismatch {
                kind,
                expected: type_name::<C>(),
            })
    }

    /// Run `validate()` on every cache, in registration order.
    ///
    /// Caches may invalidate themselves while validating; those signals
    /// propagate as they happen.
    pub fn validate_all(&self) -> Result<SweepReport, RegistryError> {
        self.sweep("validate_all", |entry, cache, report| {
            let stale = cache.validate()?;
            report.checked.push(entry.kind);
            if stale {
                report.stale.push(entry.kind);
            }
            Ok(())
        })
    }

    /// Run `validate()` on every cache and force `invalidate()` on the
    /// stale ones, in registration order.
    ///
    /// A cache that already raised `Invalidated` during its own
    /// `validate()` is not invalidated a second time.
    pub fn invalidate_all(&self) -> Result<SweepReport, RegistryError> {
        self.sweep("invalidate_all", |entry, cache, report| {
            let before = entry.invalidations();
            let stale = cache.validate()?;
            report.checked.push(entry.kind);
            if !stale {
                return Ok(());
            }

            report.stale.push(entry.kind);
            if entry.invalidations() != before {
                report.self_invalidated.push(entry.kind);
            } else {
                cache.invalidate()?;
                report.invalidated.push(entry.kind);
            }
            Ok(())
        })
    }

    /// Reconcile an out-of-band "`kind` was updated at `claimed`" notice
    /// with the cache's own state.
    ///
    /// Emits `Updated(kind, last_updated_at)` when the cache is fresh, or
    /// when its timestamp differs from `claimed`. Returns whether the
    /// event was emitted.
    pub fn reconcile(&self, kind: CacheKind, claimed: Timestamp) -> Result<bool, RegistryError> {
        let cache = self.get(kind)?;
        let stale = cache.validate()?;
        let current = cache.last_updated_at();

        if !stale || current != claimed {
            self.inner.forward(&CacheEvent::Updated {
                kind: cache.kind(),
                at: current,
            });
            return Ok(true);
        }

        trace!(%kind, %claimed, "Cache stale at claimed time, nothing to announce");
        Ok(false)
    }

    /// [`reconcile`](Self::reconcile) driven by an update notice.
    pub fn reconcile_event(&self, event: &CacheUpdateEvent) -> Result<bool, RegistryError> {
        self.reconcile(event.kind, event.updated_at)
    }

    /// Subscribe to every event re-emitted by the registry.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Subscribe to `Invalidated` events only.
    pub fn on_invalidated<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(CacheKind) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let CacheEvent::Invalidated { kind } = event {
                listener(*kind);
            }
        })
    }

    /// Subscribe to `Updated` events only.
    pub fn on_updated<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(CacheKind, Timestamp) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let CacheEvent::Updated { kind, at } = event {
                listener(*kind, *at);
            }
        })
    }

    /// Remove a registry listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Unsubscribe from every constructed cache and release them.
    ///
    /// Idempotent. Also runs when the last handle is dropped.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    /// Check whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> Vec<CacheKind> {
        self.inner.entries.read().iter().map(|entry| entry.kind).collect()
    }

    /// Check whether `kind` has an initializer.
    pub fn is_registered(&self, kind: CacheKind) -> bool {
        self.inner.entry(kind).is_ok()
    }

    /// Check whether the cache for `kind` has been built.
    pub fn is_constructed(&self, kind: CacheKind) -> bool {
        self.inner
            .entry(kind)
            .is_ok_and(|entry| entry.slot.get().is_some())
    }

    /// Get the number of registered kinds.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Check whether no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Get the number of caches built so far.
    pub fn constructed_count(&self) -> usize {
        self.inner
            .entries
            .read()
            .iter()
            .filter(|entry| entry.slot.get().is_some())
            .count()
    }

    fn sweep<F>(&self, operation: &'static str, mut visit: F) -> Result<SweepReport, RegistryError>
    where
        F: FnMut(&RegistryEntry, &dyn ManagedCache, &mut SweepReport) -> Result<(), RegistryError>,
    {
        self.inner.ensure_open()?;

        // Snapshot so no registry lock is held while caches run.
        let entries = self.inner.entries.read().clone();
        let mut report = SweepReport::default();
        let mut failures = Vec::new();

        for entry in entries {
            let cache = match self.inner.config.sweep_scope {
                SweepScope::AllRegistered => self.inner.attach(&entry),
                SweepScope::ConstructedOnly => match entry.constructed() {
                    Some(cache) => Ok(cache),
                    None => {
                        report.skipped.push(entry.kind);
                        continue;
                    }
                },
            };

            let outcome = cache.and_then(|cache| visit(&entry, &*cache, &mut report));
            if let Err(err) = outcome {
                match self.inner.config.batch_policy {
                    BatchPolicy::FailFast => return Err(err),
                    BatchPolicy::CollectAndContinue => {
                        warn!(kind = %entry.kind, error = %err, "Cache failed during {}", operation);
                        failures.push((entry.kind, err));
                    }
                }
            }
        }

        debug!(operation, ?report, failed = failures.len(), "Sweep finished");
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SweepFailure { report, failures }.into())
        }
    }
}

/// Narrowing accessors for the well-known kinds.
macro_rules! typed_accessors {
    ($($name:ident => $kind:ident),* $(,)?) => {
        impl CacheRegistry {
            $(
                #[doc = concat!("[`get_as`](Self::get_as) for [`CacheKind::", stringify!($kind), "`].")]
                pub fn $name<C: ManagedCache + 'static>(&self) -> Result<Arc<C>, RegistryError> {
                    self.get_as(CacheKind::$kind)
                }
            )*
        }
    };
}

typed_accessors! {
    branch_cache => Branches,
    git_log_cache => GitLog,
    git_tracking_status_cache => GitAheadBehind,
    git_status_cache => GitStatus,
    git_locks_cache => GitLocks,
    git_user_cache => GitUser,
    repository_info_cache => RepositoryInfo,
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("config", &self.inner.config)
            .field("kinds", &self.kinds())
            .field("constructed", &self.constructed_count())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
