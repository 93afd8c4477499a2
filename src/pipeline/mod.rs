//! Item processing pipeline.
//!
//! Every queued item flows through:
//! 1. `Classifier::classify()`: text to structured tasks
//! 2. `build_rows()`: tasks to spreadsheet rows
//! 3. `Persister::add_rows()`: rows saved

pub mod processor;

pub use processor::{TaskProcessor, build_rows};
