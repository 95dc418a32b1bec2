//! fundcache - fetch fund data through a resilient cache
//!
//! A thin host around the library: it wires the cache store, health monitor,
//! error log and HTTP transport together, runs one command, and exits.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::warn;

use fundcache::api::FundApi;
use fundcache::cache::{
    CacheStore, CleanupTask, EphemeralStorage, FileStorage, PersistentStorage,
};
use fundcache::cli::{params_from_args, Cli, Command};
use fundcache::clock::{Clock, SystemClock};
use fundcache::config::AppConfig;
use fundcache::fallback::{all_strategies, endpoint_name, ErrorLogCollector, HealthMonitor};
use fundcache::request::{execute_with_fallback, HttpTransport, RequestOrchestrator};

/// Opens the persistent tier, falling back to a process-local store
fn open_storage(config: &AppConfig) -> Arc<dyn PersistentStorage> {
    let quota = config.storage_quota_bytes;
    match config.cache_dir.clone().or_else(FileStorage::default_dir) {
        Some(dir) => match FileStorage::open(&dir, quota) {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "Cannot open cache directory, caching in memory only"
                );
                Arc::new(EphemeralStorage::with_quota(quota))
            }
        },
        None => {
            warn!("No cache directory available, caching in memory only");
            Arc::new(EphemeralStorage::with_quota(quota))
        }
    }
}

/// Prints the fallback table
fn print_strategies() {
    for strategy in all_strategies() {
        let fallbacks = if strategy.fallbacks.is_empty() {
            "-".to_string()
        } else {
            strategy.fallbacks.join(", ")
        };
        let default = strategy
            .default_value
            .map(|d| d.to_value().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\n  primary:   {}\n  fallbacks: {}\n  combine:   {}\n  default:   {}",
            strategy.name,
            strategy.primary,
            fallbacks,
            strategy.combine_strategy.unwrap_or("-"),
            default
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = cli.config();
    fundcache::setup_tracing(&config.log_level)?;

    if cli.command == Command::Strategies {
        print_strategies();
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(CacheStore::new(open_storage(&config), clock.clone()));

    match cli.command {
        Command::Cleanup => {
            let report = CleanupTask::run_once(&cache);
            println!(
                "Removed {} expired and {} unreadable entries",
                report.persistent_evicted, report.corrupt_evicted
            );
        }
        Command::Clear => {
            cache.clear();
            println!("Cache cleared");
        }
        Command::Stats => {
            let stats = cache.stats();
            println!(
                "{} entries, {} bytes in persistent cache",
                stats.persistent_entries, stats.persistent_bytes
            );
        }
        Command::Strategies => {}
        Command::Fetch {
            path,
            params,
            ttl,
            no_cache,
            diagnostics,
        } => {
            let params = params_from_args(&params);
            let client = reqwest::Client::builder()
                .user_agent(concat!("fundcache/", env!("CARGO_PKG_VERSION")))
                .build()?;
            let orchestrator = Arc::new(RequestOrchestrator::new(
                Arc::new(HttpTransport::with_client(client, config.base_url.clone())),
                Arc::new(HealthMonitor::new(clock.clone())),
                Arc::new(ErrorLogCollector::new(clock.clone())),
            ));
            let api = FundApi::new(cache.clone(), orchestrator.clone())
                .with_version(config.cache_version.clone())
                .with_timeout(config.request_timeout)
                .with_long_timeout(config.long_request_timeout);

            let result = if no_cache {
                execute_with_fallback(&orchestrator, &path, &params, config.request_timeout)
                    .await
                    .map(|resolved| resolved.value)
            } else {
                api.fetch(endpoint_name(&path), &path, &params, Duration::from_secs(ttl))
                    .await
            };
            CleanupTask::run_once(&cache);

            if diagnostics {
                eprintln!(
                    "health: {}",
                    serde_json::to_string_pretty(&orchestrator.health().all_statuses())?
                );
                eprintln!(
                    "errors: {}",
                    serde_json::to_string_pretty(&orchestrator.errors().get())?
                );
            }

            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
    }

    Ok(())
}
