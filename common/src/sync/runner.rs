// Watch-mode runner: repeats sync cycles on a fixed interval until shut down

use super::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument};

/// Runs one cycle per tick. Cycles never overlap: the next tick is only
/// observed once the previous cycle has returned.
pub struct SyncRunner {
    orchestrator: Arc<SyncOrchestrator>,
    poll_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncRunner {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, poll_interval: Duration) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            orchestrator,
            poll_interval,
            shutdown_tx,
        }
    }

    /// Sender that stops the loop once the current cycle (if any) finishes
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Loop until a shutdown signal arrives; returns the number of cycles run
    #[instrument(skip(self), fields(poll_interval_seconds = self.poll_interval.as_secs()))]
    pub async fn start(&self) -> usize {
        info!("Starting sync runner");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut cycles = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping sync runner");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    match self.orchestrator.run_cycle().await {
                        Ok(report) => info!(
                            batch_id = %report.batch_id,
                            created = report.created(),
                            failed = report.failed(),
                            "Cycle completed"
                        ),
                        Err(e) => error!(error = %e, "Cycle aborted, retrying on next tick"),
                    }
                }
            }
        }

        info!(cycles, "Sync runner stopped");
        cycles
    }
}
