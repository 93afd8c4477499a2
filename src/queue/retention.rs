//! Periodic purge of old terminal items.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::MIN_TICK;
use crate::queue::store::QueueStore;

/// Spawn a background task that purges terminal items older than `retention`
/// every `interval`, until `cancel` fires.
pub fn spawn_retention_task(
    store: Arc<dyn QueueStore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match store.purge_older_than(retention).await {
                Ok(removed) => debug!(removed, "Retention sweep finished"),
                Err(e) => warn!(error = %e, "Retention sweep failed"),
            }
        }

        debug!("Retention task stopped");
    })
}
