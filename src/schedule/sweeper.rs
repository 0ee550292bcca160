//! Background expiry sweep

use crate::schedule::ScheduleRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running sweeper task
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            log::error!("Expiry sweeper task failed: {}", e);
        }
    }
}

/// Periodically expire due schedules and purge closed ones older than the
/// configured retention.
pub fn spawn_expiry_sweeper(registry: Arc<ScheduleRegistry>) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let interval = registry.config().sweep_interval;
    let retention = registry.config().retention;

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::debug!("Expiry sweeper started ({:?} interval)", interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = registry.clock().now();
                    let expired = registry.sweep_expired(now).await;
                    if !expired.is_empty() {
                        log::debug!("Sweep expired {} schedule(s)", expired.len());
                    }
                    let purged = registry.purge_closed(now - retention).await;
                    if purged > 0 {
                        log::debug!("Sweep purged {} closed schedule(s)", purged);
                    }
                }
                _ = shutdown_rx.recv() => {
                    log::debug!("Expiry sweeper stopping");
                    break;
                }
            }
        }
    });

    SweeperHandle { shutdown_tx, join }
}
