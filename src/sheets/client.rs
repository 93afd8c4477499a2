//! Google Apps Script webhook client.
//!
//! The script accepts `{"action": ...}` JSON posts and answers with
//! `{"status": "success" | "error", ...}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::PersistenceError;
use crate::sheets::{Persister, TaskRow, TeamMember};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTasksResponse {
    status: String,
    #[serde(default)]
    rows_added: usize,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetTeamResponse {
    status: String,
    #[serde(default)]
    team: Vec<TeamMember>,
    #[serde(default)]
    error: Option<String>,
}

/// Persister backed by a spreadsheet webhook.
pub struct SheetsClient {
    webhook_url: String,
    client: reqwest::Client,
}

impl SheetsClient {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, PersistenceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PersistenceError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }

    /// Team members listed in the sheet.
    pub async fn get_team(&self) -> Result<Vec<TeamMember>, PersistenceError> {
        let resp: GetTeamResponse = self.post(&json!({ "action": "get_team" })).await?;
        check_status(&resp.status, resp.error)?;

        tracing::debug!(team_size = resp.team.len(), "Fetched team from sheet");
        Ok(resp.team)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        body: &serde_json::Value,
    ) -> Result<T, PersistenceError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(body)
            .send()
            .await
            .map_err(|e| PersistenceError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PersistenceError::HttpStatus(status.as_u16()));
        }

        resp.json()
            .await
            .map_err(|e| PersistenceError::Decode(e.to_string()))
    }
}

fn check_status(status: &str, error: Option<String>) -> Result<(), PersistenceError> {
    if status == "success" {
        return Ok(());
    }
    Err(PersistenceError::Rejected(
        error
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("status {status}")),
    ))
}

#[async_trait]
impl Persister for SheetsClient {
    async fn add_rows(&self, rows: &[TaskRow]) -> Result<usize, PersistenceError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let body = json!({ "action": "add_tasks", "tasks": rows });
        let resp: AddTasksResponse = self.post(&body).await?;
        check_status(&resp.status, resp.error)?;

        tracing::info!(rows_added = resp.rows_added, "Rows added to sheet");
        Ok(resp.rows_added)
    }

    async fn health_check(&self) -> Result<(), PersistenceError> {
        self.get_team().await.map(|_| ())
    }
}
