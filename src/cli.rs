//! Command-line interface parsing for fundcache
//!
//! Handles the global connection and cache flags plus the subcommands used
//! to fetch through the cache and to maintain it.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::Params;
use crate::config::AppConfig;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// A request parameter was not written as `key=value`
    #[error("Invalid parameter: '{0}'. Expected KEY=VALUE")]
    InvalidParam(String),
}

/// fundcache - cached, fault-tolerant access to the fund data API
#[derive(Parser, Debug)]
#[command(name = "fundcache")]
#[command(about = "Cached, fault-tolerant access to the fund data API")]
#[command(version)]
pub struct Cli {
    /// Base URL of the data API
    #[arg(long, global = true, env = "FUNDCACHE_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Directory of the persistent cache
    #[arg(long, global = true, env = "FUNDCACHE_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache version tag; changing it orphans earlier entries
    #[arg(long, global = true, env = "FUNDCACHE_CACHE_VERSION", value_name = "TAG")]
    pub cache_version: Option<String>,

    /// Byte budget of the persistent cache
    #[arg(long, global = true, env = "FUNDCACHE_QUOTA_BYTES", value_name = "BYTES")]
    pub quota_bytes: Option<usize>,

    /// Timeout of ordinary requests in seconds
    #[arg(long, global = true, env = "FUNDCACHE_TIMEOUT_SECS", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Timeout of heavy requests (rankings, long histories) in seconds
    #[arg(long, global = true, env = "FUNDCACHE_LONG_TIMEOUT_SECS", value_name = "SECS")]
    pub long_timeout_secs: Option<u64>,

    /// Log filter used when RUST_LOG is unset (e.g. info, debug)
    #[arg(long, global = true, env = "FUNDCACHE_LOG", value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Fetch an endpoint through the cache and print the JSON result
    ///
    /// Examples:
    ///   fundcache fetch /fund_name_em
    ///   fundcache fetch /fund_open_fund_info_em -p symbol=000001 -p indicator=单位净值走势
    Fetch {
        /// Endpoint path relative to the base URL
        path: String,

        /// Query parameter, repeatable
        #[arg(
            short = 'p',
            long = "param",
            value_name = "KEY=VALUE",
            value_parser = parse_param_arg
        )]
        params: Vec<(String, String)>,

        /// Cache lifetime of the result in seconds
        #[arg(long, value_name = "SECS", default_value_t = 300)]
        ttl: u64,

        /// Bypass the cache (fallbacks still apply)
        #[arg(long)]
        no_cache: bool,

        /// Print endpoint health and logged errors to stderr afterwards
        #[arg(long)]
        diagnostics: bool,
    },
    /// Remove expired and unreadable entries from the persistent cache
    Cleanup,
    /// Remove every entry this tool has cached
    Clear,
    /// Show persistent cache usage
    Stats,
    /// List the configured endpoint fallbacks
    Strategies,
}

/// Parses a `key=value` request parameter.
///
/// # Returns
/// * `Ok((key, value))`; the value may be empty
/// * `Err(CliError::InvalidParam)` if there is no `=` or the key is empty
pub fn parse_param_arg(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidParam(s.to_string())),
    }
}

/// Collects parsed parameters into an ordered map; later duplicates win
pub fn params_from_args(args: &[(String, String)]) -> Params {
    args.iter().cloned().collect()
}

impl Cli {
    /// Applies flag and environment overrides on top of `config`
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref dir) = self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(ref version) = self.cache_version {
            config.cache_version = version.clone();
        }
        if let Some(quota) = self.quota_bytes {
            config.storage_quota_bytes = quota;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.long_timeout_secs {
            config.long_request_timeout = Duration::from_secs(secs);
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }
    }

    /// Defaults with this command line applied
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        self.apply_to(&mut config);
        config
    }
}
