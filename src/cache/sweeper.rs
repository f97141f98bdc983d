//! Periodic purge of expired cache entries.
//!
//! Expiry is already enforced at read time; the sweep only reclaims memory
//! held by keys nobody reads any more.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use super::store::CacheStore;
use crate::error::{CoinCacheError, Result};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Handle for a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn a task that purges `store` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<CacheStore>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired cache entries");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Cache sweeper stopping");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, task }
    }

    /// Stop the sweeper and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`CoinCacheError::Other`] if the task panicked or was aborted.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.task.await.map_err(task_failed)
    }
}

fn task_failed(e: JoinError) -> CoinCacheError {
    CoinCacheError::Other(anyhow::anyhow!("cache sweeper task failed: {e}"))
}
