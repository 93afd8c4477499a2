//! Spreadsheet persistence for classified tasks.

pub mod client;

pub use client::SheetsClient;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Status every new row starts with.
pub const INITIAL_ROW_STATUS: &str = "Not Started";

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub timestamp: String,
    pub people: Vec<String>,
    pub summary: String,
    pub full_message: String,
    pub status: String,
    pub bot_notes: String,
}

impl TaskRow {
    /// A fresh "Not Started" row stamped with the current time.
    pub fn new(
        people: Vec<String>,
        summary: impl Into<String>,
        full_message: impl Into<String>,
        bot_notes: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            people,
            summary: summary.into(),
            full_message: full_message.into(),
            status: INITIAL_ROW_STATUS.to_string(),
            bot_notes: bot_notes.into(),
        }
    }
}

/// A team member listed in the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Where processed tasks end up.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Append rows. Returns how many the backend reports as added.
    async fn add_rows(&self, rows: &[TaskRow]) -> Result<usize, PersistenceError>;

    /// Check that the backend is reachable and answering.
    async fn health_check(&self) -> Result<(), PersistenceError>;
}
