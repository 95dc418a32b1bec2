//! Runtime configuration
//!
//! Defaults suit a local data gateway. The command line layers flags and
//! their `FUNDCACHE_*` environment variables on top (see `Cli::apply_to`).

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{CACHE_VERSION, DEFAULT_QUOTA_BYTES};
use crate::request::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, LONG_TIMEOUT};

/// Settings for the cache, the transport and logging
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Base URL the endpoint paths are resolved against
    pub base_url: String,
    /// Directory of the persistent cache; `None` uses the XDG cache directory
    pub cache_dir: Option<PathBuf>,
    /// Version tag embedded in every cache key
    pub cache_version: String,
    /// Byte budget of the persistent tier
    pub storage_quota_bytes: usize,
    /// Timeout for ordinary requests
    pub request_timeout: Duration,
    /// Timeout for heavy requests
    pub long_request_timeout: Duration,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: None,
            cache_version: CACHE_VERSION.to_string(),
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
            request_timeout: DEFAULT_TIMEOUT,
            long_request_timeout: LONG_TIMEOUT,
            log_level: "warn".to_string(),
        }
    }
}
