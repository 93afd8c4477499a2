//! Batch progress monitor: one task per submitted batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bot::messages;
use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::queue::MIN_TICK;
use crate::queue::model::StatusCounts;
use crate::queue::progress::{BatchSummary, BatchTracker};

/// Monitor pacing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often progress is polled.
    pub interval: Duration,
    /// Stop reporting after this long, whatever the batch state.
    pub timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

/// How a monitor ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Completed(BatchSummary),
    TimedOut(StatusCounts),
    Cancelled,
    /// Progress could not be read from the store.
    Lost,
}

/// Poll a batch until it completes, reporting each change to the submitter.
///
/// Sends a progress update whenever the counts change and a final summary
/// once every item is terminal. Gives up after `config.timeout`.
pub async fn monitor_batch(
    tracker: BatchTracker,
    channel: Arc<dyn Channel>,
    origin: IncomingMessage,
    batch_id: Uuid,
    config: MonitorConfig,
    cancel: CancellationToken,
) -> MonitorOutcome {
    let deadline = Instant::now() + config.timeout;
    let mut ticker = tokio::time::interval(config.interval.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the batch-start notice already covers it.
    ticker.tick().await;

    let mut last: Option<StatusCounts> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Monitor cancelled");
                return MonitorOutcome::Cancelled;
            }
            _ = tokio::time::sleep_until(deadline) => {
                let counts = last.unwrap_or_default();
                warn!(timeout = ?config.timeout, "Batch monitor timed out");
                notify(channel.as_ref(), &origin, messages::batch_timed_out(&counts)).await;
                return MonitorOutcome::TimedOut(counts);
            }
            _ = ticker.tick() => {}
        }

        let counts = match tracker.progress(batch_id).await {
            Ok(counts) => counts,
            Err(e) => {
                error!(error = %e, "Failed to read batch progress");
                notify(channel.as_ref(), &origin, messages::PROGRESS_UNAVAILABLE.to_string()).await;
                return MonitorOutcome::Lost;
            }
        };

        if counts.is_complete() {
            let summary = BatchSummary::from(counts);
            info!(
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Batch complete"
            );
            notify(channel.as_ref(), &origin, messages::batch_complete(&summary)).await;
            return MonitorOutcome::Completed(summary);
        }

        if last != Some(counts) {
            debug!(?counts, "Batch progress changed");
            notify(channel.as_ref(), &origin, messages::progress(&counts)).await;
            last = Some(counts);
        }
    }
}

async fn notify(channel: &dyn Channel, origin: &IncomingMessage, text: String) {
    if let Err(e) = channel.respond(origin, OutgoingResponse::text(text)).await {
        warn!(error = %e, "Failed to send batch update");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::MessageStream;
    use crate::error::ChannelError;
    use crate::queue::model::{FormatTag, ItemStatus, NewItem};
    use crate::queue::store::QueueStore;
    use crate::store::LibSqlQueueStore;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(response.content);
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn fast() -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        }
    }

    async fn setup(texts: &[&str]) -> (Arc<LibSqlQueueStore>, Uuid) {
        let store = Arc::new(LibSqlQueueStore::new_memory().await.unwrap());
        let items: Vec<NewItem> = texts
            .iter()
            .map(|t| NewItem::new(*t, FormatTag::Bullet))
            .collect();
        let batch_id = store.enqueue_batch(&items).await.unwrap()[0].batch_id;
        (store, batch_id)
    }

    #[tokio::test]
    async fn reports_completion_with_failures() {
        let (store, batch_id) = setup(&["ok", "bad"]).await;
        let channel = Arc::new(RecordingChannel::default());

        let monitor = tokio::spawn(monitor_batch(
            BatchTracker::new(store.clone()),
            channel.clone(),
            IncomingMessage::new("test", "u", "- ok\n- bad"),
            batch_id,
            fast(),
            CancellationToken::new(),
        ));

        let a = store.claim_next_pending().await.unwrap().unwrap();
        store.set_status(a.id, ItemStatus::Complete, None).await.unwrap();
        let b = store.claim_next_pending().await.unwrap().unwrap();
        store
            .set_status(b.id, ItemStatus::Failed, Some("Save failed"))
            .await
            .unwrap();

        let outcome = monitor.await.unwrap();
        assert_eq!(
            outcome,
            MonitorOutcome::Completed(BatchSummary {
                total: 2,
                succeeded: 1,
                failed: 1,
                complete: true,
            })
        );

        let sent = channel.sent.lock().unwrap();
        let last = sent.last().unwrap();
        assert!(last.contains("Batch processing complete"));
        assert!(last.contains("❌ Failed: 1"));
        assert!(!last.contains("Save failed"));
    }

    #[tokio::test]
    async fn unchanged_progress_is_sent_once() {
        let (store, batch_id) = setup(&["a"]).await;
        let channel = Arc::new(RecordingChannel::default());
        let cancel = CancellationToken::new();

        let monitor = tokio::spawn(monitor_batch(
            BatchTracker::new(store.clone()),
            channel.clone(),
            IncomingMessage::new("test", "u", "a"),
            batch_id,
            fast(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(monitor.await.unwrap(), MonitorOutcome::Cancelled);

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("⏳ Pending: 1"));
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let (store, batch_id) = setup(&["stuck"]).await;
        let channel = Arc::new(RecordingChannel::default());
        let config = MonitorConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(80),
        };

        let outcome = monitor_batch(
            BatchTracker::new(store.clone()),
            channel.clone(),
            IncomingMessage::new("test", "u", "stuck"),
            batch_id,
            config,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(outcome, MonitorOutcome::TimedOut(c) if c.pending == 1));
        let sent = channel.sent.lock().unwrap();
        assert!(sent.last().unwrap().contains("taking longer than expected"));
    }
}
