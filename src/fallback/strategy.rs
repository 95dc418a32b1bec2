//! Static fallback table for upstream endpoints
//!
//! Each entry names the primary endpoint, the alternates to try in order
//! when it fails transiently, and the value to hand back when all of them do.

use serde_json::Value;

/// Routing prefix callers may put in front of an endpoint path
const ROUTING_PREFIX: &str = "/api/public/";

/// Value returned when every endpoint of a strategy has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    /// An empty JSON array
    EmptyList,
    /// JSON `null`
    Null,
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::EmptyList => Value::Array(Vec::new()),
            DefaultValue::Null => Value::Null,
        }
    }
}

/// Fallback configuration for one logical endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackStrategy {
    /// Logical endpoint name the strategy is registered under
    pub name: &'static str,
    /// Endpoint path tried first
    pub primary: &'static str,
    /// Alternate endpoint paths, in the order they are tried
    pub fallbacks: &'static [&'static str],
    /// Identifier of a multi-endpoint composition that can replace the primary
    pub combine_strategy: Option<&'static str>,
    /// Value to return when every endpoint failed
    pub default_value: Option<DefaultValue>,
}

static FALLBACK_STRATEGIES: &[FallbackStrategy] = &[
    // Fund NAV history: ETF history endpoint serves the same shape
    FallbackStrategy {
        name: "fund_open_fund_info_em",
        primary: "/fund_open_fund_info_em",
        fallbacks: &["/fund_etf_fund_info_em"],
        combine_strategy: None,
        default_value: Some(DefaultValue::EmptyList),
    },
    // Deprecated upstream; replaced by composing basic-info queries
    FallbackStrategy {
        name: "fund_overview_em",
        primary: "/fund_overview_em",
        fallbacks: &[],
        combine_strategy: Some("fund_basic_info"),
        default_value: Some(DefaultValue::Null),
    },
    FallbackStrategy {
        name: "fund_portfolio_hold_em",
        primary: "/fund_portfolio_hold_em",
        fallbacks: &[],
        combine_strategy: None,
        default_value: Some(DefaultValue::EmptyList),
    },
];

/// Reduces an endpoint path to its logical name
///
/// Strips the routing prefix, any query string and a leading slash, so
/// `/api/public/fund_overview_em?symbol=1` and `/fund_overview_em` both
/// become `fund_overview_em`.
pub fn endpoint_name(path: &str) -> &str {
    let path = path.strip_prefix(ROUTING_PREFIX).unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);
    path.trim_start_matches('/')
}

/// Looks up the fallback strategy for an endpoint path
///
/// `None` means no fallback is configured and the failure is final.
pub fn get_fallback_strategy(path: &str) -> Option<&'static FallbackStrategy> {
    let name = endpoint_name(path);
    FALLBACK_STRATEGIES.iter().find(|s| s.name == name)
}

/// Every registered strategy, in table order
pub fn all_strategies() -> &'static [FallbackStrategy] {
    FALLBACK_STRATEGIES
}
