//! Per-endpoint health tracking
//!
//! Keeps an exponential moving average of the error rate and latency for
//! every endpoint that has been called, and classifies the endpoint from
//! those two numbers after each call:
//! - error rate above 0.5: down
//! - error rate above 0.2 or latency above 5s: degraded
//! - otherwise: healthy
//!
//! There is no reset. An endpoint recovers only through successful calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;

/// Weight kept from the previous average on every update
const DECAY: f64 = 0.9;

const DOWN_ERROR_RATE: f64 = 0.5;
const DEGRADED_ERROR_RATE: f64 = 0.2;
const DEGRADED_LATENCY_MS: f64 = 5000.0;

/// Health classification of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Down,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Down => "down",
        };
        f.write_str(label)
    }
}

/// Health snapshot of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub endpoint: String,
    pub status: Health,
    /// Moving average of failures, in `[0, 1]`
    pub error_rate: f64,
    /// Moving average of latency in milliseconds
    pub avg_latency_ms: f64,
    /// Epoch milliseconds of the last update
    pub last_check: i64,
}

fn classify(error_rate: f64, avg_latency_ms: f64) -> Health {
    if error_rate > DOWN_ERROR_RATE {
        Health::Down
    } else if error_rate > DEGRADED_ERROR_RATE || avg_latency_ms > DEGRADED_LATENCY_MS {
        Health::Degraded
    } else {
        Health::Healthy
    }
}

/// Tracks decaying error-rate and latency statistics per endpoint
pub struct HealthMonitor {
    health: RwLock<HashMap<String, HealthStatus>>,
    clock: Arc<dyn Clock>,
}

impl HealthMonitor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            health: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Folds one completed call into the endpoint's statistics
    pub fn update(&self, endpoint: &str, success: bool, latency: Duration) {
        let now = self.clock.now_ms();
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut health = self.health.write();
        let current = health
            .entry(endpoint.to_string())
            .or_insert_with(|| HealthStatus {
                endpoint: endpoint.to_string(),
                status: Health::Healthy,
                error_rate: 0.0,
                avg_latency_ms: 0.0,
                last_check: now,
            });

        let failure = if success { 0.0 } else { 1.0 - DECAY };
        current.error_rate = current.error_rate * DECAY + failure;
        current.avg_latency_ms = current.avg_latency_ms * DECAY + latency_ms * (1.0 - DECAY);
        current.last_check = now;

        let previous = current.status;
        current.status = classify(current.error_rate, current.avg_latency_ms);

        if previous != current.status {
            match current.status {
                Health::Healthy => info!(
                    endpoint,
                    from = %previous,
                    "Endpoint recovered"
                ),
                status => warn!(
                    endpoint,
                    from = %previous,
                    to = %status,
                    error_rate = current.error_rate,
                    avg_latency_ms = current.avg_latency_ms,
                    "Endpoint health changed"
                ),
            }
        }
    }

    /// Current snapshot for an endpoint, if it has been called
    pub fn status(&self, endpoint: &str) -> Option<HealthStatus> {
        self.health.read().get(endpoint).cloned()
    }

    /// Snapshots of every tracked endpoint, sorted by endpoint
    pub fn all_statuses(&self) -> Vec<HealthStatus> {
        let mut statuses: Vec<_> = self.health.read().values().cloned().collect();
        statuses.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        statuses
    }

    /// Whether callers should prefer a fallback for this endpoint
    ///
    /// An endpoint with no history is not a reason to fall back.
    pub fn should_fallback(&self, endpoint: &str) -> bool {
        self.health
            .read()
            .get(endpoint)
            .is_some_and(|s| matches!(s.status, Health::Degraded | Health::Down))
    }
}
