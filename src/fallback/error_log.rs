//! Bounded log of transient upstream failures

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::error::UpstreamError;
use crate::clock::Clock;

/// Number of entries kept before the oldest are dropped
pub const MAX_ERROR_LOGS: usize = 100;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorLogEntry {
    pub endpoint: String,
    pub params: Value,
    pub message: String,
    pub status: Option<u16>,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub retry_count: u32,
}

/// Newest-first failure log with a fixed capacity
pub struct ErrorLogCollector {
    logs: Mutex<VecDeque<ErrorLogEntry>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl ErrorLogCollector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(MAX_ERROR_LOGS, clock)
    }

    fn with_capacity(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            logs: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
            clock,
        }
    }

    /// Records a failure, evicting the oldest entry once over capacity
    pub fn add(&self, endpoint: &str, params: Value, error: &UpstreamError, retry_count: u32) {
        warn!(
            endpoint,
            status = ?error.status(),
            error = %error,
            retry_count,
            "Upstream API error"
        );

        let entry = ErrorLogEntry {
            endpoint: endpoint.to_string(),
            params,
            message: error.to_string(),
            status: error.status(),
            timestamp: self.clock.now_ms(),
            retry_count,
        };

        let mut logs = self.logs.lock();
        logs.push_front(entry);
        logs.truncate(self.capacity);
    }

    /// All retained entries, newest first
    pub fn get(&self) -> Vec<ErrorLogEntry> {
        self.logs.lock().iter().cloned().collect()
    }

    /// Failure count per endpoint across the retained entries
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for log in self.logs.lock().iter() {
            *stats.entry(log.endpoint.clone()).or_insert(0) += 1;
        }
        stats
    }

    pub fn clear(&self) {
        self.logs.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.logs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn collector() -> ErrorLogCollector {
        ErrorLogCollector::new(Arc::new(ManualClock::new(0)))
    }

    fn server_error() -> UpstreamError {
        UpstreamError::Status {
            status: 502,
            body: None,
        }
    }

    #[test]
    fn test_keeps_newest_hundred() {
        let log = collector();

        for i in 0..150 {
            log.add(&format!("/endpoint_{}", i), Value::Null, &server_error(), 0);
        }

        let entries = log.get();
        assert_eq!(entries.len(), MAX_ERROR_LOGS);
        assert_eq!(entries.first().unwrap().endpoint, "/endpoint_149");
        assert_eq!(entries.last().unwrap().endpoint, "/endpoint_50");
    }

    #[test]
    fn test_entry_captures_failure_details() {
        let clock = Arc::new(ManualClock::new(1_234));
        let log = ErrorLogCollector::new(clock);

        log.add("/fund_overview_em", json!({ "symbol": "000001" }), &server_error(), 2);

        let entry = &log.get()[0];
        assert_eq!(entry.params["symbol"], "000001");
        assert_eq!(entry.message, "upstream returned status 502");
        assert_eq!(entry.status, Some(502));
        assert_eq!(entry.timestamp, 1_234);
        assert_eq!(entry.retry_count, 2);
    }

    #[test]
    fn test_stats_count_per_endpoint() {
        let log = collector();
        log.add("/a", Value::Null, &server_error(), 0);
        log.add("/b", Value::Null, &server_error(), 0);
        log.add("/a", Value::Null, &server_error(), 1);

        let stats = log.stats();
        assert_eq!(stats.get("/a"), Some(&2));
        assert_eq!(stats.get("/b"), Some(&1));
    }

    #[test]
    fn test_clear_empties_log() {
        let log = collector();
        log.add("/a", Value::Null, &server_error(), 0);

        log.clear();

        assert!(log.is_empty());
        assert!(log.stats().is_empty());
    }
}
