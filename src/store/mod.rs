//! Persistence layer: libSQL-backed storage for the task queue.

pub mod libsql_backend;
pub mod migrations;

pub use libsql_backend::LibSqlQueueStore;
