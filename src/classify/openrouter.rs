//! OpenRouter chat-completions classifier.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::classify::{ClassifyResponse, Classifier, parse_classification};
use crate::error::ClassificationError;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

const PROVIDER: &str = "openrouter";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str =
    "You are a task parser that ONLY returns valid JSON. Never include explanations or additional text.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenRouterClassifier {
    api_key: SecretString,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenRouterClassifier {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self, ClassificationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassificationError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            api_key,
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client,
        })
    }

    /// Point at a different completions URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body<'a>(&'a self, text: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: build_prompt(text, Utc::now().date_naive()),
                },
            ],
        }
    }
}

#[async_trait]
impl Classifier for OpenRouterClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn classify(&self, text: &str) -> Result<ClassifyResponse, ClassificationError> {
        tracing::debug!(model = %self.model, chars = text.len(), "Classifying item");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| ClassificationError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassificationError::HttpStatus {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        let body: ChatResponse =
            resp.json()
                .await
                .map_err(|e| ClassificationError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: format!("Failed to decode completion: {e}"),
                })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ClassificationError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "no choices in response".to_string(),
            })?;

        let parsed = parse_classification(PROVIDER, &content, text)?;
        tracing::info!(task_count = parsed.tasks.len(), "Item classified");
        Ok(parsed)
    }
}

/// User prompt for one item. `today` anchors relative dates.
fn build_prompt(text: &str, today: NaiveDate) -> String {
    let example_due = today + TimeDelta::days(5);
    let quoted = serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""));

    format!(
        r#"Parse this message into tasks and return ONLY a JSON object, no other text.

Current Date: {today}
Message: {quoted}

Rules:
1. Split multi-task messages into separate tasks (bullet points, "AND", or clear task boundaries).
2. For each task:
   - people: array of who is DOING the task (lowercase), or ["team"] if unclear
   - client: who the task is FOR; tasks in one chain share a client; whoever asks is the client; "Unsure" if unclear
   - summary: brief task description (max 80 chars)
   - dueDate: ONLY if explicitly mentioned (YYYY-MM-DD), otherwise "Unsure"
   - confidence: 0.0-1.0

Example input: "Gemma to ask oxccu for press release, then Lilly to draft it by friday"
Example output:
{{
  "tasks": [
    {{"people": ["gemma"], "client": "oxccu", "summary": "Ask for press release", "dueDate": "Unsure", "confidence": 0.95}},
    {{"people": ["lilly"], "client": "oxccu", "summary": "Draft press release", "dueDate": "{example_due}", "confidence": 0.95}}
  ],
  "original_message": "Gemma to ask oxccu for press release, then Lilly to draft it by friday"
}}

Return ONLY the JSON for the given message:"#
    )
}
