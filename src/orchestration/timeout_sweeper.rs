//! # Timeout Sweeper
//!
//! Optional background driver for [`ApprovalEngine::sweep_timeouts`]. The
//! engine owns no scheduler; services that have no cron of their own can
//! spawn this instead.

use super::approval_engine::ApprovalEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct TimeoutSweeper {
    engine: Arc<ApprovalEngine>,
    interval: Duration,
}

/// Running sweeper; dropping it without calling `shutdown` leaves the task running
pub struct SweeperHandle {
    shutdown_sender: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweep loop and wait for the in-flight sweep to finish
    pub async fn shutdown(self) {
        // The loop may already have exited; a closed channel is fine
        let _ = self.shutdown_sender.send(());
        if let Err(e) = self.join_handle.await {
            error!(error = %e, "Timeout sweeper task failed");
        }
    }
}

impl TimeoutSweeper {
    pub fn new(engine: Arc<ApprovalEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Sweep once with the engine clock's current time, returning how many
    /// instances changed
    pub async fn sweep_once(&self) -> usize {
        let as_of = self.engine.clock().now();
        match self.engine.sweep_timeouts(as_of).await {
            Ok(mutated) => {
                debug!(as_of = %as_of, mutated = mutated.len(), "Timeout sweep completed");
                mutated.len()
            }
            Err(e) => {
                error!(error = %e, as_of = %as_of, "Timeout sweep failed");
                0
            }
        }
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_sender, mut shutdown_receiver) = oneshot::channel::<()>();
        info!(interval = ?self.interval, "Starting timeout sweeper");

        let join_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_receiver => break,
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
            info!("Timeout sweeper stopped");
        });

        SweeperHandle {
            shutdown_sender,
            join_handle,
        }
    }
}
