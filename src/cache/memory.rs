//! Volatile tier holding already-decoded entries

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use super::CacheEntry;

/// Unbounded in-process map used for payloads the persistent tier cannot take
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, CacheEntry<Value>>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry<Value>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, entry: CacheEntry<Value>) {
        self.entries.lock().insert(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry that is no longer live at `now_ms`; returns how many were dropped
    pub fn evict_expired(&self, now_ms: i64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now_ms));
        before - entries.len()
    }
}
