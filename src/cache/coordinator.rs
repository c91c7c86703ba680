//! Request coordination on top of [`CacheStore`].
//!
//! `RequestCache::get` is the read path every view uses: a fresh entry is
//! returned directly, a key that is already being fetched is joined, and
//! anything else starts exactly one fetch whose outcome is handed to every
//! caller that asked in the meantime. Failures are never stored.

use std::any::type_name;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::error::{CacheError, FetchError};
use super::keys::CacheKey;
use super::lock::MutexExt;
use super::store::{CacheStore, CachedValue, Freshness, downcast};

const METRIC_CACHE_COALESCED: &str = "reword_cache_coalesced_total";
const METRIC_CACHE_FETCH_ERROR: &str = "reword_cache_fetch_error_total";
const METRIC_CACHE_FETCH_MS: &str = "reword_cache_fetch_ms";

type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, FetchError>>>;

struct PendingRequest {
    id: u64,
    fetch: SharedFetch,
}

struct CacheInner {
    config: CacheConfig,
    store: CacheStore,
    pending: Mutex<HashMap<String, PendingRequest>>,
    next_request_id: AtomicU64,
    /// Bumped by `clear`; fetches started under an older epoch do not write.
    epoch: AtomicU64,
}

/// Snapshot of the cache for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub pending: usize,
    pub keys: Vec<String>,
}

/// Shared handle to the client cache.
///
/// Cloning is cheap; all clones see the same entries and in-flight fetches.
#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<CacheInner>,
}

impl RequestCache {
    pub fn new(config: CacheConfig) -> Self {
        let store = CacheStore::new(&config);
        Self {
            inner: Arc::new(CacheInner {
                config,
                store,
                pending: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the fresh value under `key`, or load it with `fetch`.
    ///
    /// `fetch` is only invoked when there is neither a fresh entry nor an
    /// outstanding request for `key`. The fetch runs as its own task, so it
    /// completes and populates the cache even if every caller goes away.
    pub async fn get<T, F, Fut>(&self, key: &str, fetch: F, ttl: Duration) -> Result<T, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let shared = {
            let mut pending = self.inner.pending.lock_recovered("coordinator.get");

            // Checked under the pending lock: a fetch finishing concurrently
            // writes the store before it drops its pending entry.
            if let Some(value) = self.inner.store.get_erased(key) {
                debug!(key, "Cache hit");
                return typed::<T>(key, value);
            }

            if let Some(request) = pending.get(key) {
                counter!(METRIC_CACHE_COALESCED).increment(1);
                debug!(key, request_id = request.id, "Joining in-flight request");
                request.fetch.clone()
            } else {
                let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
                let epoch = self.inner.epoch.load(Ordering::SeqCst);
                debug!(key, request_id = id, "Cache miss, starting fetch");

                let shared = self.spawn_fetch(key.to_string(), id, epoch, fetch, ttl);
                pending.insert(
                    key.to_string(),
                    PendingRequest {
                        id,
                        fetch: shared.clone(),
                    },
                );
                shared
            }
        };

        let value = shared.await?;
        typed::<T>(key, value)
    }

    /// [`get`](Self::get) with the TTL implied by the key's resource.
    pub async fn get_keyed<T, F, Fut>(&self, key: &CacheKey<T>, fetch: F) -> Result<T, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let ttl = self.inner.config.ttl_for(key.ttl_class());
        self.get(key.as_str(), fetch, ttl).await
    }

    /// Fresh value under `key` without fetching.
    pub fn get_cached<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.inner.store.get(key)
    }

    pub fn get_cached_keyed<T>(&self, key: &CacheKey<T>) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.inner.store.get(key.as_str())
    }

    /// Last value stored under `key`, labelled with its freshness.
    pub fn get_last_known<T>(&self, key: &str) -> Option<(T, Freshness)>
    where
        T: Clone + 'static,
    {
        self.inner.store.get_stale(key)
    }

    /// Evict `key`. A fetch already in flight still writes its result.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.inner.store.evict(key);
        debug!(key, removed, "Cache key invalidated");
        removed
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = self.inner.store.evict_prefix(prefix);
        debug!(prefix, removed, "Cache prefix invalidated");
        removed
    }

    /// Drop every entry and forget in-flight fetches.
    ///
    /// Fetches that are still running finish for their callers but their
    /// results are not stored.
    pub fn clear(&self) {
        let mut pending = self.inner.pending.lock_recovered("coordinator.clear");
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let abandoned = pending.len();
        pending.clear();
        self.inner.store.clear();
        drop(pending);

        info!(epoch, abandoned, "Cache cleared");
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock_recovered("coordinator.pending_len").len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.store.len(),
            pending: self.pending_len(),
            keys: self.inner.store.keys(),
        }
    }

    fn spawn_fetch<T, F, Fut>(
        &self,
        key: String,
        id: u64,
        epoch: u64,
        fetch: F,
        ttl: Duration,
    ) -> SharedFetch
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let resource = key.clone();

        let task = tokio::spawn(async move {
            let started_at = Instant::now();
            let result = match AssertUnwindSafe(async move { fetch().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result.map(|value| Arc::new(value) as CachedValue),
                Err(_) => Err(FetchError::transport(key.as_str(), "fetch panicked")),
            };
            histogram!(METRIC_CACHE_FETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

            if let Err(err) = &result {
                counter!(METRIC_CACHE_FETCH_ERROR).increment(1);
                warn!(key = %key, request_id = id, error = %err, "Fetch failed, nothing cached");
            }

            inner.complete(&key, id, epoch, &result, ttl);
            result
        });

        let owner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    // The task never reached `complete`; release the key here.
                    owner.release(&resource, id);
                    warn!(key = %resource, request_id = id, error = %err, "Fetch task aborted");
                    Err(FetchError::transport(resource, format!("fetch task aborted: {err}")))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl CacheInner {
    fn complete(
        &self,
        key: &str,
        id: u64,
        epoch: u64,
        result: &Result<CachedValue, FetchError>,
        ttl: Duration,
    ) {
        let mut pending = self.pending.lock_recovered("coordinator.complete");

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(key, request_id = id, "Fetch finished after clear, result dropped");
            return;
        }

        if let Ok(value) = result {
            self.store.set_erased(key, Arc::clone(value), ttl);
            debug!(
                key,
                request_id = id,
                ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
                "Cached fetch result"
            );
        }

        if pending.get(key).is_some_and(|request| request.id == id) {
            pending.remove(key);
        }
    }

    /// Drop the pending entry for `key` if it still belongs to request `id`.
    fn release(&self, key: &str, id: u64) {
        let mut pending = self.pending.lock_recovered("coordinator.release");
        if pending.get(key).is_some_and(|request| request.id == id) {
            pending.remove(key);
        }
    }
}

fn typed<T>(key: &str, value: CachedValue) -> Result<T, CacheError>
where
    T: Clone + 'static,
{
    downcast::<T>(key, &value).ok_or_else(|| CacheError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::time::sleep;

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn fetch_after(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        result: Result<u32, FetchError>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, FetchError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(delay).await;
                result
            }
            .boxed()
        }
    }

    async fn wait_for_pending(cache: &RequestCache) {
        while cache.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_skips_fetch() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get("k", fetch_after(&calls, Duration::from_millis(5), Ok(1)), TTL)
            .await
            .expect("first load");
        let second = cache
            .get("k", fetch_after(&calls, Duration::from_millis(5), Ok(2)), TTL)
            .await
            .expect("cached load");

        assert_eq!((first, second), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get("k", fetch_after(&calls, Duration::from_millis(50), Ok(7)), TTL),
            cache.get("k", fetch_after(&calls, Duration::from_millis(50), Ok(8)), TTL),
            cache.get("k", fetch_after(&calls, Duration::from_millis(50), Ok(9)), TTL),
        );

        assert_eq!(a.expect("a"), 7);
        assert_eq!(b.expect("b"), 7);
        assert_eq!(c.expect("c"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reaches_every_caller_and_is_not_cached() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = FetchError::status("k", 503);

        let (a, b) = tokio::join!(
            cache.get("k", fetch_after(&calls, Duration::from_millis(10), Err(failure.clone())), TTL),
            cache.get("k", fetch_after(&calls, Duration::from_millis(10), Ok(1)), TTL),
        );

        assert_eq!(a.expect_err("a").as_fetch(), Some(&failure));
        assert_eq!(b.expect_err("b").as_fetch(), Some(&failure));
        assert!(cache.get_cached::<u32>("k").is_none());
        assert_eq!(cache.pending_len(), 0);

        let retried = cache
            .get("k", fetch_after(&calls, Duration::from_millis(10), Ok(3)), TTL)
            .await
            .expect("retry");
        assert_eq!(retried, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_refetch() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(5);

        cache
            .get("k", fetch_after(&calls, Duration::ZERO, Ok(1)), ttl)
            .await
            .expect("first");
        sleep(Duration::from_secs(6)).await;
        let value = cache
            .get("k", fetch_after(&calls, Duration::ZERO, Ok(2)), ttl)
            .await
            .expect("second");

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_does_not_cancel_in_flight_fetch() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let loader = tokio::spawn({
            let cache = cache.clone();
            let fetch = fetch_after(&calls, Duration::from_millis(50), Ok(4));
            async move { cache.get("k", fetch, TTL).await }
        });
        wait_for_pending(&cache).await;

        assert!(!cache.invalidate("k"));
        assert_eq!(loader.await.expect("join").expect("load"), 4);
        assert_eq!(cache.get_cached::<u32>("k"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_completes_after_every_caller_is_dropped() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            cache.get("k", fetch_after(&calls, Duration::from_millis(50), Ok(5)), TTL),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.pending_len(), 1);

        sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.get_cached::<u32>("k"), Some(5));
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn fetch_aborted_by_runtime_shutdown_frees_the_key() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("first runtime");
        first.block_on(async {
            tokio::spawn({
                let cache = cache.clone();
                let fetch = fetch_after(&calls, Duration::from_secs(3600), Ok(1));
                async move { cache.get("k", fetch, TTL).await }
            });
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        });
        drop(first);
        assert_eq!(cache.pending_len(), 1);

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("second runtime");
        second.block_on(async {
            let joined = cache
                .get("k", fetch_after(&calls, Duration::ZERO, Ok(2)), TTL)
                .await;
            assert!(matches!(
                joined,
                Err(CacheError::Fetch(FetchError::Transport { .. }))
            ));
            assert_eq!(cache.pending_len(), 0);

            let value = cache
                .get("k", fetch_after(&calls, Duration::from_millis(1), Ok(2)), TTL)
                .await
                .expect("fresh fetch after abort");
            assert_eq!(value, 2);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_cached::<u32>("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discards_results_of_older_fetches() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let old = tokio::spawn({
            let cache = cache.clone();
            let fetch = fetch_after(&calls, Duration::from_millis(50), Ok(1));
            async move { cache.get("k", fetch, TTL).await }
        });
        wait_for_pending(&cache).await;

        cache.clear();
        assert_eq!(cache.pending_len(), 0);

        let new = tokio::spawn({
            let cache = cache.clone();
            let fetch = fetch_after(&calls, Duration::from_millis(100), Ok(2));
            async move { cache.get("k", fetch, TTL).await }
        });
        wait_for_pending(&cache).await;

        // The pre-clear caller still gets its answer, but it is not stored
        // and the newer pending entry survives.
        assert_eq!(old.await.expect("join").expect("old load"), 1);
        assert!(cache.get_cached::<u32>("k").is_none());
        assert_eq!(cache.pending_len(), 1);

        assert_eq!(new.await.expect("join").expect("new load"), 2);
        assert_eq!(cache.get_cached::<u32>("k"), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_fetch_is_reported_as_failure() {
        let cache = RequestCache::new(CacheConfig::default());

        let err = cache
            .get::<u32, _, _>(
                "k",
                || async {
                    let exploded = true;
                    assert!(!exploded, "backend exploded");
                    Ok(1)
                },
                TTL,
            )
            .await
            .expect_err("panic surfaces as error");

        assert!(matches!(err.as_fetch(), Some(FetchError::Transport { .. })));
        assert_eq!(cache.pending_len(), 0);
    }

    #[tokio::test]
    async fn reading_under_a_different_type_is_a_mismatch() {
        let cache = RequestCache::new(CacheConfig::default());
        cache
            .get("k", || async { Ok::<_, FetchError>("text".to_string()) }, TTL)
            .await
            .expect("string load");

        let err = cache
            .get::<u32, _, _>("k", || async { Ok(1) }, TTL)
            .await
            .expect_err("type mismatch");
        assert!(matches!(err, CacheError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn stats_report_entries_and_pending() {
        let cache = RequestCache::new(CacheConfig::default());
        cache
            .get("usage-stats-1", || async { Ok::<_, FetchError>(1_u32) }, TTL)
            .await
            .expect("load");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.keys, vec!["usage-stats-1".to_string()]);
    }
}
