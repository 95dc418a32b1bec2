//! Fund data API facade
//!
//! Typed entry points for the fund endpoints. Each one builds a
//! versioned cache key, reads through the cache store, and on a miss calls
//! the upstream with the fallback policy applied. Values substituted from a
//! strategy default are returned but never cached, so a recovered endpoint
//! is picked up on the next call.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CacheKey, CacheStore, Params, CACHE_VERSION};
use crate::fallback::UpstreamError;
use crate::request::{
    execute_with_fallback, RequestOrchestrator, Resolution, DEFAULT_TIMEOUT, LONG_TIMEOUT,
};

/// Real-time quotes change every minute
const REALTIME_TTL: Duration = Duration::from_secs(60);
/// Rankings are recomputed a few times an hour
const RANK_TTL: Duration = Duration::from_secs(10 * 60);
/// Fund lists and holdings change rarely
const SLOW_TTL: Duration = Duration::from_secs(30 * 60);
/// Historical NAV series almost never change
const HISTORY_TTL: Duration = Duration::from_secs(60 * 60);

/// Outcome of a cache miss that must not be stored
enum Uncacheable {
    Defaulted(Value),
    Failed(UpstreamError),
}

/// Read-through access to the fund endpoints
pub struct FundApi {
    cache: Arc<CacheStore>,
    orchestrator: Arc<RequestOrchestrator>,
    version: String,
    timeout: Duration,
    long_timeout: Duration,
}

impl FundApi {
    pub fn new(cache: Arc<CacheStore>, orchestrator: Arc<RequestOrchestrator>) -> Self {
        Self {
            cache,
            orchestrator,
            version: CACHE_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            long_timeout: LONG_TIMEOUT,
        }
    }

    /// Use a different cache version tag, orphaning entries written under the old one
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout for the heavy endpoints: rankings and NAV histories
    pub fn with_long_timeout(mut self, timeout: Duration) -> Self {
        self.long_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    fn key(&self, operation: &str) -> CacheKey {
        CacheKey::new(&self.version, operation)
    }

    /// Generic cached fetch keyed by `operation` and `params`
    pub async fn fetch(
        &self,
        operation: &str,
        path: &str,
        params: &Params,
        ttl: Duration,
    ) -> Result<Value, UpstreamError> {
        let key = self.key(operation).params(params);
        self.cached(&key, path, params, ttl, self.timeout).await
    }

    async fn cached(
        &self,
        key: &CacheKey,
        path: &str,
        params: &Params,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let result = self
            .cache
            .wrap(
                key.as_str(),
                move || async move {
                    match execute_with_fallback(&self.orchestrator, path, params, timeout)
                        .await
                    {
                        Ok(resolved) if resolved.resolution == Resolution::Default => {
                            Err(Uncacheable::Defaulted(resolved.value))
                        }
                        Ok(resolved) => Ok(resolved.value),
                        Err(error) => Err(Uncacheable::Failed(error)),
                    }
                },
                ttl,
            )
            .await;

        match result {
            Ok(value) | Err(Uncacheable::Defaulted(value)) => Ok(value),
            Err(Uncacheable::Failed(error)) => Err(error),
        }
    }

    /// All funds with code, name and type
    pub async fn fund_list(&self) -> Result<Value, UpstreamError> {
        let key = self.key("fund_list");
        self.cached(&key, "/fund_name_em", &Params::new(), SLOW_TTL, self.timeout)
            .await
    }

    /// Latest NAV of every open-end fund
    pub async fn fund_daily(&self) -> Result<Value, UpstreamError> {
        self.cached(
            &self.key("fund_daily_data"),
            "/fund_open_fund_daily_em",
            &Params::new(),
            REALTIME_TTL,
            self.timeout,
        )
        .await
    }

    /// Performance ranking for a fund category (e.g. "全部", "股票型")
    pub async fn fund_rank(&self, symbol: &str) -> Result<Value, UpstreamError> {
        let params = Params::from([("symbol".to_string(), symbol.to_string())]);
        let key = self.key("fund_rank").param(symbol);
        self.cached(&key, "/fund_open_fund_rank_em", &params, RANK_TTL, self.long_timeout)
            .await
    }

    /// Historical NAV series; `period` only applies to cumulative-return indicators
    pub async fn fund_history(
        &self,
        symbol: &str,
        indicator: &str,
        period: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut params = Params::from([
            ("symbol".to_string(), symbol.to_string()),
            ("indicator".to_string(), indicator.to_string()),
        ]);
        if let Some(period) = period {
            params.insert("period".to_string(), period.to_string());
        }
        let key = self
            .key("fund_hist")
            .param(symbol)
            .param(indicator)
            .opt_param(period);
        self.cached(&key, "/fund_open_fund_info_em", &params, HISTORY_TTL, self.long_timeout)
            .await
    }

    /// Portfolio holdings disclosed for `year`
    pub async fn fund_holdings(&self, symbol: &str, year: &str) -> Result<Value, UpstreamError> {
        let params = Params::from([
            ("symbol".to_string(), symbol.to_string()),
            ("date".to_string(), year.to_string()),
        ]);
        let key = self.key("fund_holdings").param(symbol).param(year);
        self.cached(&key, "/fund_portfolio_hold_em", &params, SLOW_TTL, self.timeout)
            .await
    }

    /// Latest quotes of exchange-traded funds
    pub async fn etf_daily(&self) -> Result<Value, UpstreamError> {
        self.cached(
            &self.key("etf_fund_daily"),
            "/fund_etf_fund_daily_em",
            &Params::new(),
            REALTIME_TTL,
            self.timeout,
        )
        .await
    }

    /// Fund overview; uncached because the endpoint is being retired upstream
    pub async fn fund_overview(&self, symbol: &str) -> Result<Value, UpstreamError> {
        let params = Params::from([("symbol".to_string(), symbol.to_string())]);
        execute_with_fallback(&self.orchestrator, "/fund_overview_em", &params, self.timeout)
            .await
            .map(|resolved| resolved.value)
    }
}
