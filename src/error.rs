//! Error types for the todo bot.

use std::time::Duration;

use crate::queue::model::ItemStatus;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage-layer errors. Never retried by the store itself.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Row decode failed: {0}")]
    Decode(String),
}

/// Queue-level errors raised by the store and the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] DatabaseError),

    #[error("Queued item {id} not found")]
    NotFound { id: i64 },

    /// The item is not in a state that permits the requested transition.
    /// Atomic claiming makes this unreachable in normal operation.
    #[error("Queued item {id} is {current}, cannot transition to {target}")]
    ClaimConflict {
        id: i64,
        current: ItemStatus,
        target: ItemStatus,
    },

    #[error("{remaining} worker(s) still running after {timeout:?}")]
    ShutdownTimeout { remaining: usize, timeout: Duration },

    #[error("{count} worker(s) died before shutdown")]
    WorkerPanicked { count: usize },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Classification service errors. Recovered locally with a fallback task.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Classifier {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Classifier {provider} returned status {status}")]
    HttpStatus { provider: String, status: u16 },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence backend errors. Fail the item being processed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Persistence request failed: {0}")]
    RequestFailed(String),

    #[error("Persistence backend returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Persistence backend rejected rows: {0}")]
    Rejected(String),

    #[error("Failed to decode persistence response: {0}")]
    Decode(String),
}

/// Item processing errors, recorded as the item's `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Save failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Classifier produced no tasks")]
    NoTasks,
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
