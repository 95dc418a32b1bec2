//! Key-value backends behind the cache tiers
//!
//! The persistent tier is a quota-limited string store with the same shape as
//! browser local storage: flat keys, string values, and a hard byte budget.
//! `FileStorage` keeps it in a single JSON document on disk so entries survive
//! restarts; `EphemeralStorage` keeps it in process for tests and for hosts
//! without a writable cache directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Default byte budget for the persistent tier (keys plus values)
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Name of the document holding all persisted entries
const STORAGE_FILE: &str = "storage.json";

/// Errors raised by a persistent backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The backing document could not be encoded
    #[error("storage encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of a persistent write
#[derive(Debug)]
pub enum WriteOutcome {
    /// The value was stored
    Ok,
    /// Storing the value would exceed the byte budget; nothing was changed
    QuotaExceeded,
    /// The backend failed for another reason; nothing was changed
    Other(StorageError),
}

#[cfg(test)]
impl WriteOutcome {
    pub(crate) fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok)
    }
}

/// A durable, quota-limited string store
pub trait PersistentStorage: Send + Sync {
    /// Returns the raw value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: String) -> WriteOutcome;

    /// Deletes `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every key currently stored, including keys owned by other users of the backend
    fn keys(&self) -> Vec<String>;

    /// Bytes currently counted against the quota
    fn usage_bytes(&self) -> usize;
}

/// Bytes an entry contributes to the quota
fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// In-memory map plus the running byte total checked against the quota
#[derive(Debug, Default)]
struct QuotaMap {
    entries: BTreeMap<String, String>,
    used: usize,
    quota: usize,
}

impl QuotaMap {
    fn new(entries: BTreeMap<String, String>, quota: usize) -> Self {
        let used = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
        Self {
            entries,
            used,
            quota,
        }
    }

    /// Size after replacing `key` with `value`, or `None` if it would not fit
    fn projected_usage(&self, key: &str, value: &str) -> Option<usize> {
        let previous = self
            .entries
            .get(key)
            .map(|old| entry_size(key, old))
            .unwrap_or(0);
        let projected = self.used - previous + entry_size(key, value);
        (projected <= self.quota).then_some(projected)
    }

    fn insert(&mut self, key: &str, value: String, projected: usize) -> Option<String> {
        self.used = projected;
        self.entries.insert(key.to_string(), value)
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.entries.remove(key)?;
        self.used -= entry_size(key, &removed);
        Some(removed)
    }

    /// Puts back the state from before an insert that could not be persisted
    fn restore(&mut self, key: &str, previous: Option<String>) {
        self.remove(key);
        if let Some(old) = previous {
            self.used += entry_size(key, &old);
            self.entries.insert(key.to_string(), old);
        }
    }
}

/// Persistent tier stored as one JSON document in a cache directory
///
/// Uses `~/.cache/fundcache/` on Linux (or the platform equivalent) unless a
/// directory is given. Every mutation rewrites the document through a
/// temporary file so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<QuotaMap>,
}

impl FileStorage {
    /// Returns the XDG-compliant cache directory for this application
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn default_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "fundcache")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Opens (or creates) the store inside `dir`
    ///
    /// A document that cannot be parsed is discarded and the store starts empty.
    pub fn open(dir: &Path, quota: usize) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STORAGE_FILE);

        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Discarding unreadable storage document"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened persistent storage");
        Ok(Self {
            path,
            state: Mutex::new(QuotaMap::new(entries, quota)),
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistentStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.state.lock().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> WriteOutcome {
        let mut state = self.state.lock();
        let Some(projected) = state.projected_usage(key, &value) else {
            return WriteOutcome::QuotaExceeded;
        };

        let previous = state.insert(key, value, projected);
        match self.persist(&state.entries) {
            Ok(()) => WriteOutcome::Ok,
            Err(e) => {
                state.restore(key, previous);
                WriteOutcome::Other(e)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if let Some(removed) = state.remove(key) {
            if let Err(e) = self.persist(&state.entries) {
                state.restore(key, Some(removed));
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    fn usage_bytes(&self) -> usize {
        self.state.lock().used
    }
}

/// Process-local persistent tier with the same quota behaviour as `FileStorage`
#[derive(Debug)]
pub struct EphemeralStorage {
    state: Mutex<QuotaMap>,
}

impl Default for EphemeralStorage {
    fn default() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }
}

impl EphemeralStorage {
    pub fn with_quota(quota: usize) -> Self {
        Self {
            state: Mutex::new(QuotaMap::new(BTreeMap::new(), quota)),
        }
    }

    /// Writes a raw value regardless of quota
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, value: &str) {
        let mut state = self.state.lock();
        state.remove(key);
        state.used += entry_size(key, value);
        state.entries.insert(key.to_string(), value.to_string());
    }
}

impl PersistentStorage for EphemeralStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.state.lock().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> WriteOutcome {
        let mut state = self.state.lock();
        match state.projected_usage(key, &value) {
            Some(projected) => {
                state.insert(key, value, projected);
                WriteOutcome::Ok
            }
            None => WriteOutcome::QuotaExceeded,
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.state.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    fn usage_bytes(&self) -> usize {
        self.state.lock().used
    }
}
