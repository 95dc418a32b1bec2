//! Deterministic cache keys
//!
//! A key is `<version>_<operation>[_<param>...]`. The store prepends its own
//! namespace prefix, so the persisted form is
//! `akshare_cache_<version>_<operation>_<params>`. Bumping the version makes
//! every earlier entry unreachable without touching its bytes.

use std::collections::BTreeMap;
use std::fmt;

/// Request parameters, ordered so that equal queries render identically
pub type Params = BTreeMap<String, String>;

/// Version tag used by the fund API facade
pub const CACHE_VERSION: &str = "v5";

/// Builder for a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    rendered: String,
}

impl CacheKey {
    /// Starts a key for `operation` under `version`
    pub fn new(version: &str, operation: &str) -> Self {
        Self {
            rendered: format!("{}_{}", version, operation),
        }
    }

    /// Appends one positional parameter
    pub fn param(mut self, value: impl fmt::Display) -> Self {
        self.rendered.push('_');
        self.rendered.push_str(&value.to_string());
        self
    }

    /// Appends an optional parameter, skipping it when absent
    pub fn opt_param<T: fmt::Display>(self, value: Option<T>) -> Self {
        match value {
            Some(v) => self.param(v),
            None => self,
        }
    }

    /// Appends every value of a parameter map in key order
    pub fn params(self, params: &Params) -> Self {
        params
            .iter()
            .fold(self, |key, (name, value)| key.param(format!("{}={}", name, value)))
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}
