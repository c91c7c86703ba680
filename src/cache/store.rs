//! Keyed storage of cached values.
//!
//! Each entry remembers when it was written and the TTL it was written with.
//! Freshness is evaluated on read, so nothing runs in the background to
//! expire entries. Values of different types share one map behind
//! [`CachedValue`]; typed reads downcast and clone.

use std::any::{Any, type_name};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::lock::RwLockExt;

pub(crate) const METRIC_CACHE_HIT: &str = "reword_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "reword_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "reword_cache_evict_total";

/// A type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Whether an entry returned by [`CacheStore::get_stale`] is still within its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh)
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn freshness(&self, now: Instant) -> Freshness {
        if now.saturating_duration_since(self.stored_at) < self.ttl {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

/// In-memory LRU of cached values with per-entry TTL.
pub struct CacheStore {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn set<T>(&self, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        self.set_erased(key, Arc::new(value), ttl);
    }

    pub fn set_erased(&self, key: &str, value: CachedValue, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };

        let displaced = self
            .entries
            .write_recovered("store.set")
            .push(key.to_string(), entry);

        // `push` hands back the old value on overwrite and the LRU victim when full.
        if let Some((evicted, _)) = displaced
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT, "cause" => "capacity").increment(1);
            debug!(key, evicted = %evicted, "Cache entry evicted for capacity");
        }
    }

    /// Fresh value under `key`, if any.
    ///
    /// A value stored as another type reads as absent.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let value = self.get_erased(key)?;
        downcast::<T>(key, &value)
    }

    pub fn get_erased(&self, key: &str) -> Option<CachedValue> {
        let now = Instant::now();
        let mut entries = self.entries.write_recovered("store.get");

        let found = entries
            .get(key)
            .filter(|entry| entry.freshness(now).is_fresh())
            .map(|entry| Arc::clone(&entry.value));
        drop(entries);

        match &found {
            Some(_) => counter!(METRIC_CACHE_HIT).increment(1),
            None => counter!(METRIC_CACHE_MISS).increment(1),
        }
        found
    }

    /// Last-known value under `key`, whether or not it has expired.
    pub fn get_stale<T>(&self, key: &str) -> Option<(T, Freshness)>
    where
        T: Clone + 'static,
    {
        let (value, freshness) = self.get_stale_erased(key)?;
        downcast::<T>(key, &value).map(|value| (value, freshness))
    }

    pub(crate) fn get_stale_erased(&self, key: &str) -> Option<(CachedValue, Freshness)> {
        let now = Instant::now();
        self.entries
            .read_recovered("store.get_stale")
            .peek(key)
            .map(|entry| (Arc::clone(&entry.value), entry.freshness(now)))
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn evict(&self, key: &str) -> bool {
        self.entries
            .write_recovered("store.evict")
            .pop(key)
            .is_some()
    }

    /// Remove every key starting with `prefix`.
    pub fn evict_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write_recovered("store.evict_prefix");
        let matching: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matching {
            entries.pop(key.as_str());
        }
        matching.len()
    }

    /// Drop every entry past its TTL.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write_recovered("store.purge_expired");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.freshness(now).is_fresh())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key.as_str());
        }
        if !expired.is_empty() {
            counter!(METRIC_CACHE_EVICT, "cause" => "expired").increment(expired.len() as u64);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.entries.write_recovered("store.clear").clear();
    }

    /// Number of entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read_recovered("store.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently held, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read_recovered("store.keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

pub(crate) fn downcast<T>(key: &str, value: &CachedValue) -> Option<T>
where
    T: Clone + 'static,
{
    let typed = (**value).downcast_ref::<T>().cloned();
    if typed.is_none() {
        warn!(
            key,
            expected = type_name::<T>(),
            "Cached value has a different type than requested"
        );
    }
    typed
}
