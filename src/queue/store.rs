//! Queue storage abstraction.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::model::{ItemStatus, NewItem, QueuedItem, StatusCounts};

/// Error recorded on items a previous process left running.
pub const INTERRUPTED_REASON: &str = "interrupted by restart";

/// Durable storage for queued items.
///
/// Every status change goes through the store, which enforces the item state
/// machine. Implementations must make `claim_next_pending` atomic across
/// concurrent callers.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert all items under one new batch id in a single transaction.
    ///
    /// Returns the stored items in insertion order. Empty input is a no-op
    /// returning an empty vec.
    async fn enqueue_batch(&self, items: &[NewItem]) -> Result<Vec<QueuedItem>, QueueError>;

    /// Take the oldest pending item and mark it running.
    async fn claim_next_pending(&self) -> Result<Option<QueuedItem>, QueueError>;

    /// Move an item to `status`, recording `error` (or clearing it).
    async fn set_status(
        &self,
        id: i64,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError>;

    /// All items of a batch, oldest first.
    async fn list_batch(&self, batch_id: Uuid) -> Result<Vec<QueuedItem>, QueueError>;

    async fn get_item(&self, id: i64) -> Result<Option<QueuedItem>, QueueError>;

    /// Item counts per status across every batch.
    async fn aggregate_status_counts(&self) -> Result<StatusCounts, QueueError>;

    /// Delete terminal items processed more than `age` ago. Returns the number removed.
    async fn purge_older_than(&self, age: Duration) -> Result<usize, QueueError>;

    /// Fail every item left running by a previous process.
    async fn fail_interrupted(&self, reason: &str) -> Result<usize, QueueError>;
}
