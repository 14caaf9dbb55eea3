//! Periodic removal of idle buckets.
//!
//! Buckets whose timestamps have all aged out of their window carry no
//! information, so a background task prunes them at a fixed interval. This
//! keeps the in-process store proportional to the set of active callers.

use crate::application::ports::Storage;
use crate::application::registry::BucketRegistry;
use crate::domain::{bucket::Bucket, key::RateLimitKey};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Error returned when sweeper configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SweeperConfigError {
    /// Sweep interval must be greater than zero
    #[error("sweep interval must be greater than 0")]
    ZeroInterval,
}

/// Error returned when the sweeper task did not stop cleanly.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The sweeper task panicked
    #[error("sweeper task panicked")]
    Panicked,
    /// The sweeper task was cancelled before it could observe shutdown
    #[error("sweeper task was cancelled")]
    Cancelled,
}

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to prune idle buckets
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl SweeperConfig {
    /// Create a sweeper config with the specified interval.
    ///
    /// # Errors
    /// Returns `SweeperConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, SweeperConfigError> {
        if interval.is_zero() {
            return Err(SweeperConfigError::ZeroInterval);
        }
        Ok(Self { interval })
    }
}

/// Prunes idle buckets from a registry.
pub struct BucketSweeper<S>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    registry: BucketRegistry<S>,
    config: SweeperConfig,
}

impl<S> BucketSweeper<S>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    /// Create a new sweeper over `registry`.
    pub fn new(registry: BucketRegistry<S>, config: SweeperConfig) -> Self {
        Self { registry, config }
    }

    /// Run one sweep and return the number of buckets removed.
    pub fn sweep(&self) -> usize {
        let removed = self.registry.prune_expired();
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.registry.len(),
                "Swept idle rate limit buckets"
            );
        }
        removed
    }

    /// Start sweeping periodically in a background task.
    ///
    /// The returned handle stops the task; dropping it without calling
    /// [`SweeperHandle::shutdown`] leaves the task running until the runtime
    /// shuts down.
    pub fn start(self) -> SweeperHandle
    where
        S: Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Bucket sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }

    /// Get the sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    ///
    /// # Errors
    /// Returns `ShutdownError` if the task panicked or was aborted.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        let _ = self.shutdown_tx.send(true);
        self.task.await.map_err(|err| {
            if err.is_panic() {
                ShutdownError::Panicked
            } else {
                ShutdownError::Cancelled
            }
        })
    }

    /// Check if the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
