//! Cache store combining the persistent and memory tiers
//!
//! Reads check the memory tier first, then the persistent tier. Writes pick
//! exactly one tier: the persistent one when the payload is small enough and
//! the backend accepts it, the memory one otherwise. A write never fails the
//! caller; the worst case is that an entry is only kept in memory.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::memory::MemoryTier;
use super::storage::{PersistentStorage, WriteOutcome};
use super::CacheEntry;
use crate::clock::{duration_ms, Clock};

/// Namespace prefix for every persisted key owned by the store
pub const CACHE_PREFIX: &str = "akshare_cache_";

/// Serialized entries larger than this skip the persistent tier
pub const SIZE_THRESHOLD_BYTES: usize = 1024 * 1024;

/// TTL used when a caller has no better idea
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Which tier currently holds an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Persistent,
    Memory,
}

/// Counts from a cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Expired entries removed from the persistent tier
    pub persistent_evicted: usize,
    /// Expired entries removed from the memory tier
    pub memory_evicted: usize,
    /// Unparseable persistent entries removed
    pub corrupt_evicted: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.persistent_evicted + self.memory_evicted + self.corrupt_evicted
    }
}

/// Snapshot of cache counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_entries: usize,
    pub persistent_entries: usize,
    pub persistent_bytes: usize,
}

/// Two-tier TTL cache with a read-through `wrap` helper
pub struct CacheStore {
    prefix: String,
    persistent: Arc<dyn PersistentStorage>,
    memory: MemoryTier,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    /// Creates a store over `persistent` using the default namespace prefix
    pub fn new(persistent: Arc<dyn PersistentStorage>, clock: Arc<dyn Clock>) -> Self {
        Self::with_prefix(CACHE_PREFIX, persistent, clock)
    }

    /// Creates a store that owns only keys starting with `prefix`
    pub fn with_prefix(
        prefix: impl Into<String>,
        persistent: Arc<dyn PersistentStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            persistent,
            memory: MemoryTier::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn miss<T>(&self) -> Option<T> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Returns the cached value for `key` if a live entry exists
    ///
    /// Expired or unreadable entries are evicted and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let storage_key = self.storage_key(key);
        let now = self.clock.now_ms();

        if let Some(entry) = self.memory.get(&storage_key) {
            if entry.is_live(now) {
                return match serde_json::from_value(entry.data) {
                    Ok(data) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        Some(data)
                    }
                    Err(e) => {
                        warn!(key, error = %e, "Cached value has unexpected shape, evicting");
                        self.memory.remove(&storage_key);
                        self.miss()
                    }
                };
            }
            self.memory.remove(&storage_key);
        }

        let Some(raw) = self.persistent.get(&storage_key) else {
            return self.miss();
        };

        let decoded = serde_json::from_str::<CacheEntry<Value>>(&raw).and_then(|entry| {
            if entry.is_live(now) {
                serde_json::from_value(entry.data).map(Some)
            } else {
                Ok(None)
            }
        });

        match decoded {
            Ok(Some(data)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            Ok(None) => {
                self.remove_persistent(&storage_key);
                self.miss()
            }
            Err(e) => {
                warn!(key, error = %e, "Malformed cache entry, evicting");
                self.remove_persistent(&storage_key);
                self.miss()
            }
        }
    }

    /// Stores `data` under `key` for `ttl`
    ///
    /// Never fails: oversize payloads and payloads the persistent tier rejects
    /// are kept in the memory tier instead.
    pub fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) {
        let storage_key = self.storage_key(key);
        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "Cannot serialize value for caching");
                return;
            }
        };
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_ms(),
            ttl: u64::try_from(duration_ms(ttl)).unwrap_or(0),
        };

        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                error!(key, error = %e, "Cannot encode cache entry");
                return;
            }
        };

        if serialized.len() > SIZE_THRESHOLD_BYTES {
            warn!(
                key,
                size_mb = serialized.len() as f64 / 1024.0 / 1024.0,
                "Payload too large for persistent cache, using memory cache instead"
            );
            self.store_in_memory(&storage_key, entry);
            return;
        }

        match self.persistent.set(&storage_key, serialized) {
            WriteOutcome::Ok => {
                self.memory.remove(&storage_key);
            }
            WriteOutcome::QuotaExceeded => {
                warn!(key, "Persistent cache quota exceeded, falling back to memory cache");
                self.cleanup();
                self.store_in_memory(&storage_key, entry);
            }
            WriteOutcome::Other(e) => {
                error!(
                    key,
                    error = %e,
                    "Persistent cache write failed, falling back to memory cache"
                );
                self.store_in_memory(&storage_key, entry);
            }
        }
    }

    fn store_in_memory(&self, storage_key: &str, entry: CacheEntry<Value>) {
        self.remove_persistent(storage_key);
        self.memory.insert(storage_key, entry);
    }

    fn remove_persistent(&self, storage_key: &str) {
        if let Err(e) = self.persistent.remove(storage_key) {
            error!(key = storage_key, error = %e, "Failed to delete persistent cache entry");
        }
    }

    /// Deletes `key` from both tiers
    pub fn remove(&self, key: &str) {
        let storage_key = self.storage_key(key);
        self.memory.remove(&storage_key);
        self.remove_persistent(&storage_key);
    }

    /// Wipes the memory tier and every persistent key in this store's namespace
    pub fn clear(&self) {
        for key in self.persistent.keys() {
            if key.starts_with(&self.prefix) {
                self.remove_persistent(&key);
            }
        }
        self.memory.clear();
    }

    /// Evicts every expired or unreadable entry from both tiers
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now_ms();
        let mut report = CleanupReport::default();

        for key in self.persistent.keys() {
            if !key.starts_with(&self.prefix) {
                continue;
            }
            let Some(raw) = self.persistent.get(&key) else {
                continue;
            };
            match serde_json::from_str::<CacheEntry<Value>>(&raw) {
                Ok(entry) if entry.is_live(now) => {}
                Ok(_) => {
                    self.remove_persistent(&key);
                    report.persistent_evicted += 1;
                }
                Err(_) => {
                    self.remove_persistent(&key);
                    report.corrupt_evicted += 1;
                }
            }
        }

        report.memory_evicted = self.memory.evict_expired(now);

        debug!(
            persistent = report.persistent_evicted,
            memory = report.memory_evicted,
            corrupt = report.corrupt_evicted,
            "Cache cleanup finished"
        );
        report
    }

    /// Returns the cached value for `key`, or runs `fetcher` and caches its result
    ///
    /// Concurrent misses for the same key each run their own fetcher; the last
    /// one to finish wins the slot. A failed fetch is returned unchanged and
    /// nothing is cached.
    pub async fn wrap<T, E, F, Fut>(&self, key: &str, fetcher: F, ttl: Duration) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key) {
            debug!(key, "Cache hit");
            return Ok(cached);
        }

        debug!(key, "Cache miss");
        let data = fetcher().await?;
        self.set(key, &data, ttl);
        Ok(data)
    }

    /// Reports which tier holds `key`, without checking expiry
    pub fn tier_of(&self, key: &str) -> Option<Tier> {
        let storage_key = self.storage_key(key);
        if self.memory.contains(&storage_key) {
            Some(Tier::Memory)
        } else if self.persistent.get(&storage_key).is_some() {
            Some(Tier::Persistent)
        } else {
            None
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_entries: self.memory.len(),
            persistent_entries: self
                .persistent
                .keys()
                .iter()
                .filter(|k| k.starts_with(&self.prefix))
                .count(),
            persistent_bytes: self.persistent.usage_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::{EphemeralStorage, StorageError};
    use crate::clock::ManualClock;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct FundRow {
        code: String,
        nav: f64,
    }

    fn row() -> FundRow {
        FundRow {
            code: "000001".to_string(),
            nav: 1.2345,
        }
    }

    /// Backend whose writes always fail for a reason other than quota
    struct ReadOnlyStorage;

    impl PersistentStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&self, _key: &str, _value: String) -> WriteOutcome {
            let e = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
            WriteOutcome::Other(StorageError::Io(e))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn keys(&self) -> Vec<String> {
            Vec::new()
        }

        fn usage_bytes(&self) -> usize {
            0
        }
    }

    fn create_test_store(quota: usize) -> (CacheStore, Arc<EphemeralStorage>, Arc<ManualClock>) {
        let storage = Arc::new(EphemeralStorage::with_quota(quota));
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = CacheStore::new(storage.clone(), clock.clone());
        (store, storage, clock)
    }

    #[test]
    fn test_set_then_get_returns_data() {
        let (store, _storage, _clock) = create_test_store(1 << 20);

        store.set("v5_fund_list", &row(), DEFAULT_TTL);

        assert_eq!(store.get::<FundRow>("v5_fund_list"), Some(row()));
        assert_eq!(store.tier_of("v5_fund_list"), Some(Tier::Persistent));
    }

    #[test]
    fn test_persisted_shape_uses_epoch_millis() {
        let (store, storage, clock) = create_test_store(1 << 20);

        store.set("k", &row(), Duration::from_secs(60));

        let raw = storage.get("akshare_cache_k").expect("entry should be persisted");
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["timestamp"], clock.now_ms());
        assert_eq!(value["ttl"], 60_000);
        assert_eq!(value["data"]["code"], "000001");
    }

    #[test]
    fn test_expired_entry_is_evicted_on_get() {
        let (store, storage, clock) = create_test_store(1 << 20);
        store.set("k", &row(), Duration::from_secs(60));

        clock.advance(Duration::from_secs(60));
        assert!(store.get::<FundRow>("k").is_some(), "age equal to ttl is live");

        clock.advance(Duration::from_millis(1));
        assert!(store.get::<FundRow>("k").is_none());
        assert!(storage.get("akshare_cache_k").is_none());
    }

    #[test]
    fn test_malformed_persistent_entry_is_a_miss() {
        let (store, storage, _clock) = create_test_store(1 << 20);
        storage.insert_raw("akshare_cache_broken", "{\"data\":");

        assert!(store.get::<Value>("broken").is_none());
        assert!(storage.get("akshare_cache_broken").is_none());
    }

    #[test]
    fn test_oversize_payload_goes_to_memory_only() {
        let (store, storage, _clock) = create_test_store(usize::MAX);
        let big = "x".repeat(SIZE_THRESHOLD_BYTES + 1);

        store.set("big", &big, DEFAULT_TTL);

        assert!(storage.get("akshare_cache_big").is_none());
        assert_eq!(store.tier_of("big"), Some(Tier::Memory));
        assert_eq!(store.get::<String>("big").map(|s| s.len()), Some(big.len()));
    }

    #[test]
    fn test_quota_exceeded_falls_back_to_memory() {
        let (store, storage, _clock) = create_test_store(64);

        store.set("quota", &row(), DEFAULT_TTL);

        assert!(storage.keys().is_empty());
        assert_eq!(store.tier_of("quota"), Some(Tier::Memory));
        assert_eq!(store.get::<FundRow>("quota"), Some(row()));
    }

    #[test]
    fn test_quota_exceeded_sweeps_expired_entries() {
        let (store, storage, clock) = create_test_store(200);
        store.set("old", &row(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(5));

        // Rejected by the quota, which triggers a sweep of the stale entry
        store.set("new", &"y".repeat(150), DEFAULT_TTL);

        assert!(storage.get("akshare_cache_old").is_none());
        assert_eq!(store.tier_of("new"), Some(Tier::Memory));
    }

    #[test]
    fn test_persistent_write_replaces_memory_copy() {
        let (store, storage, _clock) = create_test_store(1 << 20);
        let big = "x".repeat(SIZE_THRESHOLD_BYTES + 1);
        store.set("k", &big, DEFAULT_TTL);
        assert_eq!(store.tier_of("k"), Some(Tier::Memory));

        store.set("k", &row(), DEFAULT_TTL);

        assert_eq!(store.tier_of("k"), Some(Tier::Persistent));
        assert!(storage.get("akshare_cache_k").is_some());
        assert_eq!(store.stats().memory_entries, 0);
    }

    #[test]
    fn test_memory_write_replaces_persistent_copy() {
        let (store, storage, _clock) = create_test_store(1 << 20);
        store.set("k", &row(), DEFAULT_TTL);

        store.set("k", &"x".repeat(SIZE_THRESHOLD_BYTES + 1), DEFAULT_TTL);

        assert!(storage.get("akshare_cache_k").is_none());
        assert_eq!(store.tier_of("k"), Some(Tier::Memory));
    }

    #[test]
    fn test_remove_deletes_from_both_tiers() {
        let (store, _storage, _clock) = create_test_store(1 << 20);
        store.set("small", &row(), DEFAULT_TTL);
        store.set("big", &"x".repeat(SIZE_THRESHOLD_BYTES + 1), DEFAULT_TTL);

        store.remove("small");
        store.remove("big");

        assert_eq!(store.tier_of("small"), None);
        assert_eq!(store.tier_of("big"), None);
    }

    #[test]
    fn test_clear_leaves_foreign_keys_alone() {
        let (store, storage, _clock) = create_test_store(1 << 20);
        storage.insert_raw("favorites", "[\"000001\"]");
        store.set("a", &row(), DEFAULT_TTL);
        store.set("b", &"x".repeat(SIZE_THRESHOLD_BYTES + 1), DEFAULT_TTL);

        store.clear();

        assert_eq!(storage.keys(), vec!["favorites".to_string()]);
        assert_eq!(store.stats().memory_entries, 0);
    }

    #[test]
    fn test_cleanup_evicts_expired_and_corrupt() {
        let (store, storage, clock) = create_test_store(1 << 20);
        storage.insert_raw("akshare_cache_corrupt", "not json");
        storage.insert_raw("other_app_key", "not json either");
        store.set("short", &row(), Duration::from_secs(10));
        store.set("long", &row(), Duration::from_secs(3600));
        store.set("big", &"x".repeat(SIZE_THRESHOLD_BYTES + 1), Duration::from_secs(10));

        clock.advance(Duration::from_secs(11));
        let report = store.cleanup();

        assert_eq!(
            report,
            CleanupReport {
                persistent_evicted: 1,
                memory_evicted: 1,
                corrupt_evicted: 1,
            }
        );
        assert_eq!(report.total(), 3);
        assert!(storage.get("other_app_key").is_some());
        assert_eq!(store.get::<FundRow>("long"), Some(row()));
    }

    #[tokio::test]
    async fn test_wrap_fetches_once_within_ttl() {
        let (store, _storage, _clock) = create_test_store(1 << 20);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..2 {
            let data: Result<FundRow, std::io::Error> = store
                .wrap(
                    "v5_fund_list",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(row())
                    },
                    DEFAULT_TTL,
                )
                .await;
            assert_eq!(data.unwrap(), row());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_wrap_does_not_cache_failures() {
        let (store, _storage, _clock) = create_test_store(1 << 20);

        let failed: Result<FundRow, String> = store
            .wrap("k", || async { Err("upstream down".to_string()) }, DEFAULT_TTL)
            .await;
        assert_eq!(failed.unwrap_err(), "upstream down");
        assert_eq!(store.tier_of("k"), None);

        let ok: Result<FundRow, String> =
            store.wrap("k", || async { Ok(row()) }, DEFAULT_TTL).await;
        assert_eq!(ok.unwrap(), row());
    }

    #[test]
    fn test_failed_persistent_write_falls_back_to_memory() {
        let store = CacheStore::new(Arc::new(ReadOnlyStorage), Arc::new(ManualClock::new(0)));

        store.set("v5_fund_list", &row(), DEFAULT_TTL);

        assert_eq!(store.tier_of("v5_fund_list"), Some(Tier::Memory));
        assert_eq!(store.get::<FundRow>("v5_fund_list"), Some(row()));
        assert_eq!(store.stats().memory_entries, 1);
    }
}
