//! Worker pool: concurrent pollers that claim and process queued items.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{PipelineError, QueueError};
use crate::queue::model::{ItemStatus, QueuedItem};
use crate::queue::MIN_TICK;
use crate::queue::store::QueueStore;

/// Does the actual work for one claimed item.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// `Ok` marks the item Complete; `Err` marks it Failed with the error text.
    async fn process(&self, item: &QueuedItem) -> Result<(), PipelineError>;
}

/// Worker pool sizing and pacing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// How often an idle worker polls for a pending item.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A fixed set of workers sharing one store.
pub struct WorkerPool {
    store: Arc<dyn QueueStore>,
    processor: Arc<dyn ItemProcessor>,
    config: WorkerConfig,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// The pool stops when `shutdown` is called or when `parent` is cancelled.
    pub fn new(
        store: Arc<dyn QueueStore>,
        processor: Arc<dyn ItemProcessor>,
        config: WorkerConfig,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            store,
            processor,
            config,
            cancel: parent.child_token(),
            handles: Vec::new(),
        }
    }

    /// Spawn the workers. Calling it again while running does nothing.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            warn!("Worker pool already started");
            return;
        }

        let workers = self.config.workers.max(1);
        let poll_interval = self.config.poll_interval.max(MIN_TICK);
        for worker_id in 0..workers {
            let store = Arc::clone(&self.store);
            let processor = Arc::clone(&self.processor);
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(
                run_worker(store, processor, poll_interval, cancel)
                    .instrument(info_span!("worker", worker_id)),
            );
            self.handles.push(handle);
        }

        info!(
            workers,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Worker pool started"
        );
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop all workers, letting each finish its in-flight item.
    ///
    /// Workers still running after `timeout` are aborted and reported, as
    /// are workers that died before shutdown.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), QueueError> {
        self.cancel.cancel();

        let aborters: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        if let Ok(results) = tokio::time::timeout(timeout, join_all(self.handles)).await {
            let mut count = 0;
            for e in results.iter().filter_map(|r| r.as_ref().err()) {
                error!(error = %e, "Worker task died");
                count += 1;
            }
            if count > 0 {
                return Err(QueueError::WorkerPanicked { count });
            }
            info!("Worker pool stopped");
            return Ok(());
        }

        let remaining = aborters.iter().filter(|h| !h.is_finished()).count();
        for handle in &aborters {
            handle.abort();
        }
        warn!(remaining, ?timeout, "Worker pool shutdown timed out, aborting");
        Err(QueueError::ShutdownTimeout { remaining, timeout })
    }
}

async fn run_worker(
    store: Arc<dyn QueueStore>,
    processor: Arc<dyn ItemProcessor>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    debug!("Worker started");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = process_next(store.as_ref(), processor.as_ref()).await {
            error!(error = %e, "Worker failed to process queue");
        }
    }

    debug!("Worker stopped");
}

/// Claim one pending item and run it through `processor`.
///
/// Returns `true` if an item was claimed. Processing failures are recorded on
/// the item, not returned.
pub async fn process_next(
    store: &dyn QueueStore,
    processor: &dyn ItemProcessor,
) -> Result<bool, QueueError> {
    let Some(item) = store.claim_next_pending().await? else {
        return Ok(false);
    };

    debug!(item_id = item.id, batch_id = %item.batch_id, "Processing item");

    let (status, error) = match processor.process(&item).await {
        Ok(()) => (ItemStatus::Complete, None),
        Err(e) => {
            warn!(item_id = item.id, batch_id = %item.batch_id, error = %e, "Item failed");
            (ItemStatus::Failed, Some(e.to_string()))
        }
    };

    store.set_status(item.id, status, error.as_deref()).await?;
    debug!(item_id = item.id, status = %status, "Item finished");
    Ok(true)
}
