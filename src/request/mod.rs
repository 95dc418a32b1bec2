//! Request orchestration
//!
//! Every upstream call goes through `RequestOrchestrator::call`, which times
//! it, feeds the outcome to the health monitor, and records transient
//! failures in the error log before handing the result back unchanged.
//! `execute_with_fallback` layers the fallback table on top for callers that
//! want alternates and defaults applied for them.

mod http;

pub use http::{HttpTransport, DEFAULT_BASE_URL};

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::Params;
use crate::fallback::{
    get_fallback_strategy, is_ignorable_error, ErrorLogCollector, HealthMonitor, UpstreamError,
};

/// Timeout for ordinary queries
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for slow, heavy queries such as full-market rankings
pub const LONG_TIMEOUT: Duration = Duration::from_secs(120);

/// The network layer the core depends on
pub trait Transport: Send + Sync {
    /// Fetches `path` with `params` and returns the decoded JSON body
    fn request<'a>(
        &'a self,
        path: &'a str,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<Value, UpstreamError>>;
}

/// Wraps every outbound call with timing, health tracking and error logging
pub struct RequestOrchestrator {
    transport: Arc<dyn Transport>,
    health: Arc<HealthMonitor>,
    errors: Arc<ErrorLogCollector>,
}

impl RequestOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        health: Arc<HealthMonitor>,
        errors: Arc<ErrorLogCollector>,
    ) -> Self {
        Self {
            transport,
            health,
            errors,
        }
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn errors(&self) -> &ErrorLogCollector {
        &self.errors
    }

    /// Performs one call, returning the upstream outcome unchanged
    ///
    /// A timeout is reported as `UpstreamError::Timeout` and counted like any
    /// other failure.
    pub async fn call(
        &self,
        path: &str,
        params: &Params,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        self.attempt(path, params, timeout, 0).await
    }

    async fn attempt(
        &self,
        path: &str,
        params: &Params,
        timeout: Duration,
        retry_count: u32,
    ) -> Result<Value, UpstreamError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(timeout, self.transport.request(path, params)).await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };
        let elapsed = start.elapsed();

        self.health.update(path, result.is_ok(), elapsed);

        if let Err(ref error) = result {
            if is_ignorable_error(error) {
                let params = serde_json::to_value(params).unwrap_or_default();
                self.errors.add(path, params, error, retry_count);
            } else {
                debug!(path, error = %error, "Hard upstream failure");
            }
        }

        result
    }
}

/// Where a value returned by `execute_with_fallback` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The requested endpoint answered
    Primary,
    /// A configured alternate answered
    Fallback(&'static str),
    /// Every endpoint failed and the strategy's default was substituted
    Default,
}

/// A value together with how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub resolution: Resolution,
}

impl Resolved {
    fn new(value: Value, resolution: Resolution) -> Self {
        Self { value, resolution }
    }
}

/// Calls `path`, then its configured fallbacks, then its default value
///
/// Alternates are only tried after a transient failure. A hard failure from
/// any attempt is returned immediately. When every attempt fails transiently
/// the strategy's default is returned if it has one, otherwise the last
/// failure.
pub async fn execute_with_fallback(
    orchestrator: &RequestOrchestrator,
    path: &str,
    params: &Params,
    timeout: Duration,
) -> Result<Resolved, UpstreamError> {
    if orchestrator.health().should_fallback(path) {
        debug!(path, "Primary endpoint is unhealthy, trying it first anyway");
    }

    let primary_error = match orchestrator.call(path, params, timeout).await {
        Ok(value) => return Ok(Resolved::new(value, Resolution::Primary)),
        Err(error) => error,
    };

    if !is_ignorable_error(&primary_error) {
        return Err(primary_error);
    }
    let Some(strategy) = get_fallback_strategy(path) else {
        return Err(primary_error);
    };

    let mut last_error = primary_error;
    for (retry, fallback) in (1u32..).zip(strategy.fallbacks.iter().copied()) {
        info!(primary = path, fallback, "Trying fallback endpoint");
        match orchestrator.attempt(fallback, params, timeout, retry).await {
            Ok(value) => return Ok(Resolved::new(value, Resolution::Fallback(fallback))),
            Err(error) if is_ignorable_error(&error) => last_error = error,
            Err(error) => return Err(error),
        }
    }

    match strategy.default_value {
        Some(default) => {
            warn!(path, error = %last_error, "All endpoints failed, using default value");
            Ok(Resolved::new(default.to_value(), Resolution::Default))
        }
        None => Err(last_error),
    }
}
