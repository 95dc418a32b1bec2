//! Periodic cache cleanup
//!
//! The host application owns the schedule: it spawns a `CleanupTask` for a
//! store and keeps the returned handle to stop it again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::store::{CacheStore, CleanupReport};

/// Interval between sweeps when the host does not choose one
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Sweeps expired entries out of a store on a fixed interval
pub struct CleanupTask;

impl CleanupTask {
    /// Runs a single sweep
    pub fn run_once(store: &CacheStore) -> CleanupReport {
        let report = store.cleanup();
        if report.total() > 0 {
            info!(evicted = report.total(), "Evicted expired cache entries");
        }
        report
    }

    /// Spawns a background task sweeping `store` every `interval`
    ///
    /// The first sweep happens one full interval after spawning.
    pub fn spawn(store: Arc<CacheStore>, interval: Duration) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        CleanupTask::run_once(&store);
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Cache cleanup task stopped");
                        break;
                    }
                }
            }
        });

        CleanupHandle { shutdown_tx }
    }
}

/// Handle for stopping a spawned cleanup task
pub struct CleanupHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CleanupHandle {
    /// Stops the background task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
