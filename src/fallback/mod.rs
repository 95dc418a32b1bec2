//! Failure classification, endpoint health and fallback resolution
//!
//! This module decides what a failed upstream call means: whether it is a
//! transient condition that may be papered over with an alternate endpoint or
//! a default value, or a hard failure that must reach the caller untouched.

mod error;
mod error_log;
mod health;
mod strategy;

pub use error::{is_ignorable_error, ErrorClass, UpstreamError};
pub use error_log::{ErrorLogCollector, ErrorLogEntry, MAX_ERROR_LOGS};
pub use health::{Health, HealthMonitor, HealthStatus};
pub use strategy::{
    all_strategies, endpoint_name, get_fallback_strategy, DefaultValue, FallbackStrategy,
};
