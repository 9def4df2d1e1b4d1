//! Periodic eviction of stale verification records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{debug, info};

use crate::hub::VerificationHub;

/// Shortest pause between sweeps; smaller intervals are raised to this.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct SweepLoopHandle {
    /// Run a sweep now instead of waiting for the next tick.
    pub wake: Arc<Notify>,
    /// Send `true` to shut down.
    pub shutdown_tx: watch::Sender<bool>,
}

pub fn spawn_sweep_loop(
    hub: Arc<VerificationHub>,
    interval: Duration,
    max_age: Duration,
) -> (tokio::task::JoinHandle<()>, SweepLoopHandle) {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let wake_clone = wake.clone();

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            max_age_secs = max_age.as_secs(),
            "verification sweep started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wake_clone.notified() => {
                    debug!("sweep woken early");
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("verification sweep shutting down");
                        return;
                    }
                }
            }

            if *shutdown_rx.borrow() {
                return;
            }

            let evicted = hub.purge_expired(max_age);
            if evicted > 0 {
                info!(evicted, remaining = hub.cached_count(), "evicted stale verifications");
            }
        }
    });

    (handle, SweepLoopHandle { wake, shutdown_tx })
}
