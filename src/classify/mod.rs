//! Task classification: turning an item's text into structured tasks.
//!
//! The classifier is an external service and may fail or return junk. The
//! helpers here extract and normalize whatever it returns; the item processor
//! substitutes [`ClassifyResponse::fallback`] when nothing usable comes back.

pub mod openrouter;

pub use openrouter::OpenRouterClassifier;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;

/// Maximum summary length, in characters.
pub const MAX_SUMMARY_CHARS: usize = 80;

/// Placeholder for a client or due date the classifier could not determine.
pub const UNSURE: &str = "Unsure";

/// Confidence assigned to the synthetic fallback task.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Confidence assumed when the classifier omits one.
const DEFAULT_CONFIDENCE: f64 = 0.8;

static ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(the|a|an)\b").expect("valid regex"));

/// Turns free text into structured tasks.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Model identifier, for logs and `/status`.
    fn model_name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<ClassifyResponse, ClassificationError>;
}

/// One task extracted from an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTask {
    /// Who does the task, lowercase.
    #[serde(default)]
    pub people: Vec<String>,
    /// Who the task is for.
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, rename = "dueDate", alias = "due_date")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl ParsedTask {
    /// Client, unless it is unknown.
    pub fn known_client(&self) -> Option<&str> {
        known(self.client.as_deref())
    }

    /// Due date, unless it is unknown.
    pub fn known_due_date(&self) -> Option<&str> {
        known(self.due_date.as_deref())
    }
}

fn known(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != UNSURE && *v != "Internal")
}

/// Classifier output for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub tasks: Vec<ParsedTask>,
    #[serde(default)]
    pub original_message: String,
}

impl ClassifyResponse {
    /// A single best-effort task built from the raw text.
    pub fn fallback(text: &str) -> Self {
        let task = ParsedTask {
            people: vec!["team".to_string()],
            client: None,
            summary: fallback_summary(text),
            due_date: None,
            confidence: FALLBACK_CONFIDENCE,
        };
        let mut response = Self {
            tasks: vec![task],
            original_message: text.to_string(),
        };
        response.normalize();
        response
    }

    /// Fill defaults and clean up fields in place.
    pub fn normalize(&mut self) {
        let first_client = self
            .tasks
            .first()
            .and_then(|t| t.known_client())
            .map(String::from);

        for task in &mut self.tasks {
            task.people = normalize_names(&task.people);
            task.summary = truncate_summary(task.summary.trim());

            if task.known_client().is_none() {
                task.client = Some(first_client.clone().unwrap_or_else(|| UNSURE.to_string()));
            }
            if task.due_date.as_deref().is_none_or(|d| d.trim().is_empty()) {
                task.due_date = Some(UNSURE.to_string());
            }
            if task.confidence == 0.0 {
                task.confidence = DEFAULT_CONFIDENCE;
            }
        }
    }
}

/// Parse raw classifier output (possibly wrapped in prose or a code fence).
pub fn parse_classification(
    provider: &str,
    raw: &str,
    original: &str,
) -> Result<ClassifyResponse, ClassificationError> {
    let json = extract_json_object(raw).ok_or_else(|| ClassificationError::InvalidResponse {
        provider: provider.to_string(),
        reason: "no JSON object in output".to_string(),
    })?;

    let mut response: ClassifyResponse = serde_json::from_str(json)?;
    if response.tasks.is_empty() {
        return Err(ClassificationError::InvalidResponse {
            provider: provider.to_string(),
            reason: "no tasks in output".to_string(),
        });
    }
    if response.original_message.trim().is_empty() {
        response.original_message = original.to_string();
    }

    response.normalize();
    Ok(response)
}

/// Find the outermost JSON object in LLM output that might contain markdown
/// or extra text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    let inner = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end]).unwrap_or(after)
    } else {
        trimmed
    };

    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    (end > start).then(|| &inner[start..=end])
}

/// Lowercase names, map group words to "team" and drop articles.
pub fn normalize_names(names: &[String]) -> Vec<String> {
    let normalized: Vec<String> = names
        .iter()
        .filter_map(|name| {
            let clean = name.trim().to_lowercase();
            let clean = match clean.as_str() {
                "the team" | "everyone" | "all" => "team".to_string(),
                _ => clean,
            };
            let clean = ARTICLE.replace_all(&clean, "");
            let clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");
            (!clean.is_empty()).then_some(clean)
        })
        .collect();

    if normalized.is_empty() {
        vec!["team".to_string()]
    } else {
        normalized
    }
}

/// Cap a summary at [`MAX_SUMMARY_CHARS`], ending in "..." when cut.
pub fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() <= MAX_SUMMARY_CHARS {
        return summary.to_string();
    }
    let mut cut: String = summary.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

fn fallback_summary(text: &str) -> String {
    let first = text.split('.').next().map(str::trim).unwrap_or_default();
    if first.is_empty() {
        truncate_summary(text.trim())
    } else {
        truncate_summary(first)
    }
}
