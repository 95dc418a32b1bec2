//! fundcache library
//!
//! A resilient access layer for an unreliable fund data API: a tiered TTL
//! cache, per-endpoint health tracking, a bounded error log, and a static
//! fallback table, tied together by a request orchestrator.

pub mod api;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod fallback;
pub mod request;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a stderr log subscriber; `RUST_LOG` takes precedence over `level`
pub fn setup_tracing(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
}
