//! Durable task queue: splitting, storage, workers, progress, retention.

use std::time::Duration;

pub mod detector;
pub mod model;
pub mod progress;
pub mod retention;
pub mod store;
pub mod worker;

pub use detector::{detect, looks_like_batch, plan_batch, split};
pub use model::{FormatTag, ItemStatus, NewItem, QueuedItem, StatusCounts};
pub use progress::{BatchSummary, BatchTracker};
pub use retention::spawn_retention_task;
pub use store::{INTERRUPTED_REASON, QueueStore};
pub use worker::{ItemProcessor, WorkerConfig, WorkerPool};

/// Shortest period any polling loop will tick at.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);
