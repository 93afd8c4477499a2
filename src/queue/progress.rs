//! Per-batch progress tracking over the queue store.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::model::StatusCounts;
use crate::queue::store::QueueStore;

/// Final tally for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub complete: bool,
}

impl From<StatusCounts> for BatchSummary {
    fn from(counts: StatusCounts) -> Self {
        Self {
            total: counts.total(),
            succeeded: counts.complete,
            failed: counts.failed,
            complete: counts.is_complete(),
        }
    }
}

/// Read-only view of batch state. Holds no state of its own.
#[derive(Clone)]
pub struct BatchTracker {
    store: Arc<dyn QueueStore>,
}

impl BatchTracker {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Counts by status for one batch. Unknown batches report all zeros.
    pub async fn progress(&self, batch_id: Uuid) -> Result<StatusCounts, QueueError> {
        let items = self.store.list_batch(batch_id).await?;
        Ok(items.iter().map(|item| item.status).collect())
    }

    /// True once the batch has items and every one is terminal.
    pub async fn is_complete(&self, batch_id: Uuid) -> Result<bool, QueueError> {
        Ok(self.progress(batch_id).await?.is_complete())
    }

    pub async fn summary(&self, batch_id: Uuid) -> Result<BatchSummary, QueueError> {
        Ok(self.progress(batch_id).await?.into())
    }
}
