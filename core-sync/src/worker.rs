//! # Background Sync Worker
//!
//! Spawned loop that keeps the cache fresh without the host driving it.
//!
//! Each round synchronizes the configured kinds in order. Retryable failures
//! (`RemoteUnavailable`, `Storage`) are retried with the exponential backoff
//! of the [`RetryPolicy`]; the coordinator reports every failed attempt as a
//! recoverable `SyncEvent::Failed` carrying the attempt number.
//!
//! With no interval the worker runs one round and exits. With an interval it
//! runs a round per tick until shut down.

use crate::{SyncCoordinator, SyncError};
use bridge_traits::{ContentKind, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    pub kinds: Vec<ContentKind>,
    pub retry_policy: RetryPolicy,
    /// Time between rounds; `None` runs a single round
    pub interval: Option<Duration>,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            kinds: ContentKind::ALL.to_vec(),
            retry_policy: RetryPolicy::default(),
            interval: None,
        }
    }
}

/// Background sync loop
pub struct SyncWorker {
    coordinator: Arc<SyncCoordinator>,
    config: SyncWorkerConfig,
    shutdown: CancellationToken,
}

impl SyncWorker {
    /// Spawn the worker on the current runtime
    pub fn spawn(coordinator: Arc<SyncCoordinator>, config: SyncWorkerConfig) -> SyncWorkerHandle {
        let shutdown = CancellationToken::new();
        let worker = Self {
            coordinator,
            config,
            shutdown: shutdown.clone(),
        };

        let join = tokio::spawn(async move { worker.run().await });

        SyncWorkerHandle { shutdown, join }
    }

    async fn run(self) {
        let Some(period) = self.config.interval else {
            self.run_round().await;
            debug!("Single sync round finished");
            return;
        };

        info!(
            interval_ms = period.as_millis() as u64,
            kinds = self.config.kinds.len(),
            "Background sync started"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.run_round().await,
            }
        }

        info!("Background sync stopped");
    }

    async fn run_round(&self) {
        for &kind in &self.config.kinds {
            if self.shutdown.is_cancelled() {
                return;
            }
            self.sync_with_retry(kind).await;
        }
    }

    async fn sync_with_retry(&self, kind: ContentKind) {
        let policy = &self.config.retry_policy;
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let sync = self.coordinator.synchronize_attempt(kind, attempt);
            tokio::pin!(sync);

            // Shutdown cancels the fetch and lets the run record its outcome.
            let result = tokio::select! {
                result = &mut sync => result,
                _ = self.shutdown.cancelled() => {
                    self.coordinator.cancel(kind).await;
                    sync.await
                }
            };

            match result {
                Ok(summary) => {
                    debug!(kind = %kind, attempt, inserted = summary.inserted, "Background sync succeeded");
                    return;
                }
                Err(SyncError::SyncInProgress { .. }) => {
                    debug!(kind = %kind, "Sync already running, skipping");
                    return;
                }
                Err(SyncError::Cancelled) => return,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        kind = %kind,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Background sync failed, retrying"
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(kind = %kind, attempt, error = %e, "Background sync gave up");
                    return;
                }
            }
        }
    }
}

/// Handle to a spawned [`SyncWorker`]
pub struct SyncWorkerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl SyncWorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Token that stops the worker when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for a single-round worker to finish on its own
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "Sync worker task failed");
        }
    }

    /// Stop the worker and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.wait().await;
    }
}
