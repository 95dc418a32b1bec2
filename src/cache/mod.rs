//! Tiered response cache
//!
//! Small payloads go to a quota-limited persistent tier so they survive
//! restarts; large payloads, and anything the persistent tier refuses, go to
//! an in-process memory tier. Each entry carries its own TTL and is never
//! served once its age exceeds it.

mod cleanup;
mod key;
mod memory;
mod storage;
mod store;

pub use cleanup::{CleanupHandle, CleanupTask, DEFAULT_CLEANUP_INTERVAL};
pub use key::{CacheKey, Params, CACHE_VERSION};
pub use memory::MemoryTier;
pub use storage::{
    EphemeralStorage, FileStorage, PersistentStorage, StorageError, WriteOutcome,
    DEFAULT_QUOTA_BYTES,
};
pub use store::{
    CacheStats, CacheStore, CleanupReport, Tier, CACHE_PREFIX, DEFAULT_TTL, SIZE_THRESHOLD_BYTES,
};

use serde::{Deserialize, Serialize};

/// A cached value with the time it was written and how long it stays fresh
///
/// Serialized as `{ "data": ..., "timestamp": <epoch ms>, "ttl": <ms> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    /// Whether the entry may still be served at `now_ms`
    pub fn is_live(&self, now_ms: i64) -> bool {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) <= ttl
    }
}
