//! Item processor: classifies a queued item and saves the resulting rows.
//!
//! Flow per item:
//! 1. Classifier → structured tasks (fallback task on any classifier failure)
//! 2. Row building → one spreadsheet row per task
//! 3. Persister → rows appended; a failure here fails the item

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::classify::{ClassifyResponse, Classifier};
use crate::error::PipelineError;
use crate::queue::model::QueuedItem;
use crate::queue::worker::ItemProcessor;
use crate::sheets::{Persister, TaskRow};

/// Tasks below this confidence are flagged in the row notes.
const LOW_CONFIDENCE: f64 = 0.7;

/// Classify-then-persist processor run by the worker pool.
pub struct TaskProcessor {
    classifier: Arc<dyn Classifier>,
    persister: Arc<dyn Persister>,
}

impl TaskProcessor {
    pub fn new(classifier: Arc<dyn Classifier>, persister: Arc<dyn Persister>) -> Self {
        Self {
            classifier,
            persister,
        }
    }

    /// Classifier output for `item`, or the fallback task if the call fails.
    async fn classify(&self, item: &QueuedItem) -> ClassifyResponse {
        match self.classifier.classify(&item.text).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    item_id = item.id,
                    model = self.classifier.model_name(),
                    error = %e,
                    "Classification failed, using fallback task"
                );
                ClassifyResponse::fallback(&item.text)
            }
        }
    }
}

#[async_trait]
impl ItemProcessor for TaskProcessor {
    async fn process(&self, item: &QueuedItem) -> Result<(), PipelineError> {
        let response = self.classify(item).await;
        if response.tasks.is_empty() {
            return Err(PipelineError::NoTasks);
        }

        let rows = build_rows(item, &response);
        debug!(item_id = item.id, rows = rows.len(), "Saving rows");

        let added = self.persister.add_rows(&rows).await?;
        info!(item_id = item.id, batch_id = %item.batch_id, rows_added = added, "Item saved");
        Ok(())
    }
}

/// One row per task. Multi-task items get an "(i/n)" summary suffix.
pub fn build_rows(item: &QueuedItem, response: &ClassifyResponse) -> Vec<TaskRow> {
    let total = response.tasks.len();

    response
        .tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let summary = if total > 1 {
                format!("{} ({}/{})", task.summary, i + 1, total)
            } else {
                task.summary.clone()
            };

            let mut notes = format!(
                "Batch ID: {}, Confidence: {:.2}",
                item.batch_id, task.confidence
            );
            if let Some(client) = task.known_client() {
                notes.push_str(&format!(", Client: {client}"));
            }
            if let Some(due) = task.known_due_date() {
                notes.push_str(&format!(", Due: {due}"));
            }
            if task.confidence < LOW_CONFIDENCE {
                notes.push_str(" (Low confidence)");
            }

            TaskRow::new(task.people.clone(), summary, item.text.clone(), notes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::classify::ParsedTask;
    use crate::error::{ClassificationError, PersistenceError};
    use crate::queue::model::{FormatTag, ItemStatus};

    enum Reply {
        Tasks(Vec<ParsedTask>),
        Fail,
    }

    struct StubClassifier(Reply);

    #[async_trait]
    impl Classifier for StubClassifier {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn classify(&self, text: &str) -> Result<ClassifyResponse, ClassificationError> {
            match &self.0 {
                Reply::Tasks(tasks) => Ok(ClassifyResponse {
                    tasks: tasks.clone(),
                    original_message: text.to_string(),
                }),
                Reply::Fail => Err(ClassificationError::HttpStatus {
                    provider: "stub".into(),
                    status: 503,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingPersister {
        rows: Mutex<Vec<TaskRow>>,
        reject: bool,
    }

    #[async_trait]
    impl Persister for RecordingPersister {
        async fn add_rows(&self, rows: &[TaskRow]) -> Result<usize, PersistenceError> {
            if self.reject {
                return Err(PersistenceError::HttpStatus(500));
            }
            self.rows.lock().unwrap().extend_from_slice(rows);
            Ok(rows.len())
        }

        async fn health_check(&self) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn item(text: &str) -> QueuedItem {
        QueuedItem {
            id: 7,
            batch_id: Uuid::nil(),
            text: text.to_string(),
            format_tag: FormatTag::Single,
            status: ItemStatus::Running,
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
            last_error: None,
        }
    }

    fn task(summary: &str, confidence: f64) -> ParsedTask {
        ParsedTask {
            people: vec!["gemma".into()],
            client: Some("oxccu".into()),
            summary: summary.into(),
            due_date: Some("Unsure".into()),
            confidence,
        }
    }

    #[test]
    fn single_task_row_has_plain_summary() {
        let response = ClassifyResponse {
            tasks: vec![task("Ask for press release", 0.95)],
            original_message: String::new(),
        };
        let rows = build_rows(&item("Gemma to ask oxccu"), &response);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].summary, "Ask for press release");
        assert_eq!(rows[0].full_message, "Gemma to ask oxccu");
        assert_eq!(
            rows[0].bot_notes,
            format!("Batch ID: {}, Confidence: 0.95, Client: oxccu", Uuid::nil())
        );
    }

    #[test]
    fn multi_task_rows_are_numbered_and_flag_low_confidence() {
        let mut second = task("Draft it", 0.5);
        second.due_date = Some("2026-03-06".into());
        let response = ClassifyResponse {
            tasks: vec![task("Ask", 0.9), second],
            original_message: String::new(),
        };
        let rows = build_rows(&item("x"), &response);

        assert_eq!(rows[0].summary, "Ask (1/2)");
        assert_eq!(rows[1].summary, "Draft it (2/2)");
        assert!(rows[1].bot_notes.contains(", Due: 2026-03-06"));
        assert!(rows[1].bot_notes.ends_with(" (Low confidence)"));
        assert!(!rows[0].bot_notes.contains("Low confidence"));
    }

    #[tokio::test]
    async fn saves_classified_rows() {
        let persister = Arc::new(RecordingPersister::default());
        let processor = TaskProcessor::new(
            Arc::new(StubClassifier(Reply::Tasks(vec![task("a", 0.9), task("b", 0.9)]))),
            persister.clone(),
        );

        processor.process(&item("a and b")).await.unwrap();
        assert_eq!(persister.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_single_task() {
        let persister = Arc::new(RecordingPersister::default());
        let processor =
            TaskProcessor::new(Arc::new(StubClassifier(Reply::Fail)), persister.clone());

        processor
            .process(&item("Renew the domain. Soon."))
            .await
            .unwrap();

        let rows = persister.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].summary, "Renew the domain");
        assert_eq!(rows[0].people, vec!["team"]);
        assert!(rows[0].bot_notes.contains("Confidence: 0.50"));
        assert!(rows[0].bot_notes.contains("(Low confidence)"));
    }

    #[tokio::test]
    async fn persistence_failure_fails_item() {
        let persister = Arc::new(RecordingPersister {
            reject: true,
            ..Default::default()
        });
        let processor = TaskProcessor::new(
            Arc::new(StubClassifier(Reply::Tasks(vec![task("a", 0.9)]))),
            persister,
        );

        let err = processor.process(&item("a")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(err.to_string().starts_with("Save failed"));
    }

    #[tokio::test]
    async fn empty_classification_is_an_error() {
        let processor = TaskProcessor::new(
            Arc::new(StubClassifier(Reply::Tasks(Vec::new()))),
            Arc::new(RecordingPersister::default()),
        );
        let err = processor.process(&item("a")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoTasks));
    }
}
