//! Background Expiry Sweep
//!
//! Lazy expiry only reclaims keys that someone touches again. A key whose
//! deadline passes and that is never read would otherwise sit in memory
//! forever, so a background task periodically sweeps the whole deadline
//! table and evicts everything that has passed.
//!
//! The sweep runs on a fixed, configurable interval (default five minutes),
//! takes the store's write lock for the duration of one full-table scan and
//! is idempotent: back-to-back sweeps with no new expiries evict nothing.
//! Shutdown is signalled over a `watch` channel; dropping the handle stops
//! the task.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the background sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Fixed interval between sweeps
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
        }
    }
}

/// A handle to the running sweeper task.
///
/// When this handle is dropped, the task stops.
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Starts the sweeper as a background task.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use krill::storage::{Store, Sweeper, SweepConfig};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let sweeper = Sweeper::start(Arc::clone(&store), SweepConfig::default());
    /// // ... runs until dropped
    /// drop(sweeper);
    /// ```
    pub fn start(store: Arc<Store>, config: SweepConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweep_loop(store, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper.
    ///
    /// Called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(store: Arc<Store>, config: SweepConfig, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = store.sweep_expired();

        if expired > 0 {
            info!(
                expired = expired,
                keys_remaining = store.string_key_count(),
                "Evicted expired keys"
            );
        } else {
            trace!("Sweep found no expired keys");
        }
    }
}

/// Starts the sweeper with default configuration.
pub fn start_sweeper(store: Arc<Store>) -> Sweeper {
    Sweeper::start(store, SweepConfig::default())
}
