use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::watch;

use crate::{Interrupt, LoadResult, RenderResult, ResourceError, ResourceKey, Settlement};

/// Configuration for a [`ResourceCache`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name used to tag log output of this cache.
    pub name: String,
    /// Deadline applied to every producer operation.
    ///
    /// When set, an operation that has not settled within this duration is
    /// rejected with [`ResourceError::Timeout`]. `None` disables the
    /// deadline.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            name: "resources".into(),
            operation_timeout: None,
        }
    }
}

/// The lifecycle state of a cache entry.
#[derive(Debug, Clone)]
pub enum EntryState<T> {
    /// The operation is still in flight.
    Pending,
    /// The operation settled successfully.
    Fulfilled(T),
    /// The operation settled with an error.
    Rejected(ResourceError),
}

impl<T> EntryState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, EntryState::Pending)
    }

    fn status(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Fulfilled(_) => "fulfilled",
            EntryState::Rejected(_) => "rejected",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    /// Identity of this entry.
    ///
    /// Settlements compare it against the current map occupant, so a late
    /// settlement of an invalidated entry can never be applied to a newer
    /// one.
    id: u64,
    state: watch::Receiver<EntryState<T>>,
}

#[derive(Debug)]
struct Shared<T> {
    name: String,
    operation_timeout: Option<Duration>,
    entries: Mutex<HashMap<ResourceKey, Entry<T>>>,
    next_id: AtomicU64,
}

/// Keyed store of in-flight and settled asynchronous operations.
///
/// The cache guarantees at most one entry, and thus at most one concurrent
/// operation, per key: all reads issued before settlement observe the same
/// entry, and the producer runs exactly once per entry lifetime. Entries
/// stay in the cache until explicitly invalidated or the whole cache is
/// cleared; they are never dropped just because a reading subtree went
/// away.
///
/// Status transitions are performed by a continuation task attached when
/// the entry is created, never by read-time callers. Handles are cheap to
/// clone and share the same store.
pub struct ResourceCache<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        ResourceCache {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for ResourceCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self
            .shared
            .entries
            .try_lock()
            .map(|e| e.len())
            .unwrap_or_default();
        f.debug_struct("ResourceCache")
            .field("name", &self.shared.name)
            .field("entries", &entries)
            .finish()
    }
}

impl<T> ResourceCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        ResourceCache {
            shared: Arc::new(Shared {
                name: config.name,
                operation_timeout: config.operation_timeout,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Removes the entry for `key` if present.
    ///
    /// The in-flight operation is not cancelled; its late settlement is
    /// detected by entry identity and discarded. Entries of other keys are
    /// not affected.
    pub fn invalidate(&self, key: &ResourceKey) {
        let removed = self.shared.entries.lock().unwrap().remove(key);
        if removed.is_some() {
            tracing::debug!(cache = %self.shared.name, key = %key, "entry invalidated");
        }
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.shared.entries.lock().unwrap().clear();
        tracing::debug!(cache = %self.shared.name, "cache cleared");
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.shared.entries.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ResourceCache<T> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<T: Clone + Send + Sync + 'static> ResourceCache<T> {
    /// Returns the state of the entry for `key`, creating the entry if
    /// absent.
    ///
    /// If an entry exists it is returned unchanged, even while pending, and
    /// `producer` is not invoked. Otherwise `producer` is invoked exactly
    /// once, a pending entry is installed, and a continuation task settles
    /// it when the operation completes.
    ///
    /// A panic in `producer` itself is recorded as a rejected entry instead
    /// of unwinding into the caller.
    pub fn get_or_create<F, Fut>(&self, key: &ResourceKey, producer: F) -> EntryState<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult<T>> + Send + 'static,
    {
        let mut entries = self.shared.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            let state = entry.state.borrow().clone();
            tracing::trace!(
                cache = %self.shared.name,
                key = %key,
                status = state.status(),
                "entry reused"
            );
            return state;
        }

        let (id, tx) = self.install(&mut entries, key);
        drop(entries);

        tracing::debug!(cache = %self.shared.name, key = %key, "starting operation");
        match panic::catch_unwind(AssertUnwindSafe(producer)) {
            Ok(operation) => {
                self.spawn_settlement(key.clone(), id, tx, operation);
                EntryState::Pending
            }
            Err(payload) => {
                let error = ResourceError::Panicked(panic_message(payload));
                tracing::warn!(cache = %self.shared.name, key = %key, error = %error, "producer panicked");
                tx.send_replace(EntryState::Rejected(error.clone()));
                EntryState::Rejected(error)
            }
        }
    }

    /// Installs an already-created operation for `key`.
    ///
    /// Unlike [`get_or_create`](Self::get_or_create) this never reuses: if
    /// any entry exists for the key, the call fails with
    /// [`ResourceError::DuplicateOperation`] and the existing entry is left
    /// untouched.
    pub fn start<Fut>(&self, key: &ResourceKey, operation: Fut) -> Result<(), ResourceError>
    where
        Fut: Future<Output = LoadResult<T>> + Send + 'static,
    {
        let mut entries = self.shared.entries.lock().unwrap();
        if entries.contains_key(key) {
            return Err(ResourceError::DuplicateOperation(key.clone()));
        }
        let (id, tx) = self.install(&mut entries, key);
        drop(entries);

        tracing::debug!(cache = %self.shared.name, key = %key, "starting operation");
        self.spawn_settlement(key.clone(), id, tx, operation);
        Ok(())
    }

    /// Reads the value for `key`, creating the entry on first read.
    ///
    /// Returns the value if the entry is fulfilled. A pending or rejected
    /// entry is signalled through the returned [`Interrupt`] for the
    /// enclosing boundary to act on. This never blocks the calling thread,
    /// and may be called conditionally, in loops, and from any number of
    /// subtrees in the same pass.
    pub fn read<F, Fut>(&self, key: &ResourceKey, producer: F) -> RenderResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult<T>> + Send + 'static,
    {
        match self.get_or_create(key, producer) {
            EntryState::Fulfilled(value) => Ok(value),
            EntryState::Rejected(error) => Err(Interrupt::Failed(error)),
            EntryState::Pending => Err(Interrupt::Pending(self.settlement(key))),
        }
    }

    fn install(
        &self,
        entries: &mut HashMap<ResourceKey, Entry<T>>,
        key: &ResourceKey,
    ) -> (u64, watch::Sender<EntryState<T>>) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(EntryState::Pending);
        entries.insert(key.clone(), Entry { id, state: rx });
        (id, tx)
    }

    /// Handle resolving once the entry for `key` leaves its pending state.
    fn settlement(&self, key: &ResourceKey) -> Settlement {
        let rx = self
            .shared
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|entry| entry.state.clone());
        let wait = Box::pin(async move {
            let Some(mut rx) = rx else { return };
            while rx.borrow_and_update().is_pending() {
                // A closed channel means the entry was invalidated; resolve
                // so the subtree can re-render against a fresh entry.
                if rx.changed().await.is_err() {
                    return;
                }
            }
        });
        Settlement::new(key.clone(), wait)
    }

    fn spawn_settlement<Fut>(
        &self,
        key: ResourceKey,
        id: u64,
        tx: watch::Sender<EntryState<T>>,
        operation: Fut,
    ) where
        Fut: Future<Output = LoadResult<T>> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let operation = AssertUnwindSafe(operation).catch_unwind();
            let settled = match shared.operation_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation).await {
                    Ok(settled) => settled,
                    Err(_) => Ok(Err(ResourceError::Timeout(limit))),
                },
                None => operation.await,
            };
            let state = match settled {
                Ok(Ok(value)) => EntryState::Fulfilled(value),
                Ok(Err(error)) => EntryState::Rejected(error),
                Err(payload) => {
                    EntryState::Rejected(ResourceError::Panicked(panic_message(payload)))
                }
            };
            shared.settle(key, id, tx, state);
        });
    }
}

impl<T> Shared<T> {
    /// Applies a settlement to the entry it was attached to.
    ///
    /// If the entry was invalidated (and possibly recreated) while the
    /// operation was in flight, the settlement is discarded: waiters of the
    /// removed entry are released by the sender going out of scope, and the
    /// current occupant of the key is left untouched.
    fn settle(&self, key: ResourceKey, id: u64, tx: watch::Sender<EntryState<T>>, state: EntryState<T>) {
        let entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some(entry) if entry.id == id => {
                tracing::debug!(
                    cache = %self.name,
                    key = %key,
                    status = state.status(),
                    "entry settled"
                );
                tx.send_replace(state);
            }
            _ => {
                tracing::trace!(cache = %self.name, key = %key, "discarding stale settlement");
            }
        }
    }
}

/// Type-erased invalidation, letting one reset scope own keys across
/// differently-typed caches.
pub trait Invalidate: Send + Sync {
    fn invalidate_key(&self, key: &ResourceKey);
}

impl<T: Send + Sync + 'static> Invalidate for ResourceCache<T> {
    fn invalidate_key(&self, key: &ResourceKey) {
        self.invalidate(key);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::producer::{reject_after, resolve_after};

    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deduplicates() {
        let cache = ResourceCache::default();
        let key = ResourceKey::from("stats");
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = || {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                resolve_after(ms(500), 48u32)
            }
        };

        let first = cache.read(&key, producer());
        let second = cache.read(&key, producer());
        assert!(matches!(first, Err(Interrupt::Pending(_))));
        assert!(matches!(second, Err(Interrupt::Pending(_))));

        let Err(Interrupt::Pending(settlement)) = cache.read(&key, producer()) else {
            panic!("expected a pending read");
        };
        settlement.wait().await;

        assert_eq!(cache.read(&key, producer()).unwrap(), 48);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fulfilled_reads_are_idempotent() {
        let cache = ResourceCache::default();
        let key = ResourceKey::from("stats");
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = || {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                resolve_after(ms(10), "hello".to_owned())
            }
        };

        let Err(Interrupt::Pending(settlement)) = cache.read(&key, producer()) else {
            panic!("expected a pending read");
        };
        settlement.wait().await;

        for _ in 0..5 {
            assert_eq!(cache.read(&key, producer()).unwrap(), "hello");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_captured() {
        let cache: ResourceCache<u32> = ResourceCache::default();
        let key = ResourceKey::from("activities");
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = || {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                reject_after(ms(10), ResourceError::Unavailable("unavailable".into()))
            }
        };

        let Err(Interrupt::Pending(settlement)) = cache.read(&key, producer()) else {
            panic!("expected a pending read");
        };
        settlement.wait().await;

        for _ in 0..3 {
            match cache.read(&key, producer()) {
                Err(Interrupt::Failed(error)) => {
                    assert_eq!(error, ResourceError::Unavailable("unavailable".into()));
                }
                other => panic!("expected the captured error, got {other:?}"),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_retries() {
        let cache: ResourceCache<u32> = ResourceCache::default();
        let key = ResourceKey::from("stats");
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = || {
            let calls = calls.clone();
            move || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                resolve_after(ms(10), call as u32)
            }
        };

        let Err(Interrupt::Pending(settlement)) = cache.read(&key, producer()) else {
            panic!("expected a pending read");
        };
        settlement.wait().await;
        assert_eq!(cache.read(&key, producer()).unwrap(), 0);

        cache.invalidate(&key);
        assert!(!cache.contains(&key));

        let Err(Interrupt::Pending(settlement)) = cache.read(&key, producer()) else {
            panic!("expected a fresh operation after invalidation");
        };
        settlement.wait().await;
        assert_eq!(cache.read(&key, producer()).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_is_isolated() {
        let cache = ResourceCache::default();
        let stats = ResourceKey::from("stats");
        let tasks = ResourceKey::from("tasks");

        let Err(Interrupt::Pending(settlement)) =
            cache.read(&stats, || resolve_after(ms(10), 1u32))
        else {
            panic!("expected a pending read");
        };
        settlement.wait().await;
        let Err(Interrupt::Pending(settlement)) =
            cache.read(&tasks, || resolve_after(ms(10), 2u32))
        else {
            panic!("expected a pending read");
        };
        settlement.wait().await;

        cache.invalidate(&stats);

        assert!(!cache.contains(&stats));
        assert!(cache.contains(&tasks));
        assert_eq!(
            cache.read(&tasks, || resolve_after(ms(10), 99u32)).unwrap(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_settlement_is_discarded() {
        let cache = ResourceCache::default();
        let key = ResourceKey::from("stats");

        // Slow original operation.
        let first = cache.read(&key, || resolve_after(ms(100), "old".to_owned()));
        assert!(matches!(first, Err(Interrupt::Pending(_))));

        cache.invalidate(&key);

        // Fresh entry with a faster operation.
        let Err(Interrupt::Pending(settlement)) =
            cache.read(&key, || resolve_after(ms(10), "new".to_owned()))
        else {
            panic!("expected a fresh operation after invalidation");
        };
        settlement.wait().await;
        assert_eq!(cache.read(&key, || unreachable_producer()).unwrap(), "new");

        // Let the original operation settle; it must not clobber the entry.
        tokio::time::sleep(ms(200)).await;
        assert_eq!(cache.read(&key, || unreachable_producer()).unwrap(), "new");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_on_wakeup_observe_settled_entry() {
        let cache = ResourceCache::default();
        let key = ResourceKey::from("stats");

        // Several waiters re-read the moment their settlement resolves,
        // racing the settling task. Settlement transitions happen under the
        // map mutex, so every re-read must observe the final state, never a
        // half-applied one.
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let Err(Interrupt::Pending(settlement)) =
                cache.read(&key, || resolve_after(ms(50), 7u32))
            else {
                panic!("expected a pending read");
            };
            let cache = cache.clone();
            let key = key.clone();
            waiters.push(tokio::spawn(async move {
                settlement.wait().await;
                match cache.read(&key, || unreachable_producer()) {
                    Ok(value) => value,
                    Err(interrupt) => panic!("expected the settled value, got {interrupt:?}"),
                }
            }));
        }

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), 7);
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_removes_everything() {
        let cache = ResourceCache::default();
        for key in ["a", "b", "c"] {
            let _ = cache.read(&ResourceKey::from(key), || resolve_after(ms(10), 0u32));
        }
        assert_eq!(cache.len(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_duplicates() {
        let cache = ResourceCache::default();
        let key = ResourceKey::from("stats");

        cache.start(&key, resolve_after(ms(10), 1u32)).unwrap();
        let err = cache.start(&key, resolve_after(ms(10), 2u32)).unwrap_err();
        assert_eq!(err, ResourceError::DuplicateOperation(key.clone()));

        // The original operation is unaffected.
        let Err(Interrupt::Pending(settlement)) = cache.read(&key, || unreachable_producer())
        else {
            panic!("expected the original pending entry");
        };
        settlement.wait().await;
        assert_eq!(cache.read(&key, || unreachable_producer()).unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_panic_becomes_rejection() {
        let cache: ResourceCache<u32> = ResourceCache::default();
        let key = ResourceKey::from("stats");

        let result = cache.read(&key, || -> std::future::Ready<LoadResult<u32>> {
            panic!("boom")
        });
        match result {
            Err(Interrupt::Failed(error)) => {
                assert_eq!(error, ResourceError::Panicked("boom".into()));
            }
            other => panic!("expected a rejected entry, got {other:?}"),
        }

        // The rejection is recorded; no new producer runs.
        match cache.read(&key, || unreachable_producer()) {
            Err(Interrupt::Failed(error)) => {
                assert_eq!(error, ResourceError::Panicked("boom".into()));
            }
            other => panic!("expected the captured rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_panic_becomes_rejection() {
        let cache: ResourceCache<u32> = ResourceCache::default();
        let key = ResourceKey::from("stats");

        let Err(Interrupt::Pending(settlement)) = cache.read(&key, || async {
            panic!("late boom");
        }) else {
            panic!("expected a pending read");
        };
        settlement.wait().await;

        match cache.read(&key, || unreachable_producer()) {
            Err(Interrupt::Failed(error)) => {
                assert_eq!(error, ResourceError::Panicked("late boom".into()));
            }
            other => panic!("expected a rejected entry, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_timeout() {
        let cache: ResourceCache<u32> = ResourceCache::new(CacheConfig {
            operation_timeout: Some(ms(50)),
            ..Default::default()
        });
        let key = ResourceKey::from("stats");

        let Err(Interrupt::Pending(settlement)) =
            cache.read(&key, || resolve_after(ms(100), 1u32))
        else {
            panic!("expected a pending read");
        };
        settlement.wait().await;

        match cache.read(&key, || unreachable_producer()) {
            Err(Interrupt::Failed(error)) => {
                assert_eq!(error, ResourceError::Timeout(ms(50)));
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_config_from_yaml() -> anyhow::Result<()> {
        let yaml = r#"
            name: dashboard
            operation_timeout: 500ms
        "#;
        let config: CacheConfig = serde_yaml::from_str(yaml)?;
        assert_eq!(config.name, "dashboard");
        assert_eq!(config.operation_timeout, Some(ms(500)));

        let config: CacheConfig = serde_yaml::from_str("{}")?;
        assert_eq!(config.name, "resources");
        assert_eq!(config.operation_timeout, None);
        Ok(())
    }

    fn unreachable_producer<T>() -> std::future::Ready<LoadResult<T>> {
        panic!("the producer must not be invoked");
    }
}
