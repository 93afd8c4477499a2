//! libSQL backend: async `QueueStore` implementation.
//!
//! Supports local file and in-memory databases. All statements run on one
//! connection behind an async lock, so a batch transaction never interleaves
//! with another task's statements.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, QueueError};
use crate::queue::model::{ItemStatus, NewItem, QueuedItem, StatusCounts};
use crate::queue::store::QueueStore;
use crate::store::migrations;

const ITEM_COLUMNS: &str =
    "id, batch_id, text, format_tag, status, created_at, processed_at, last_error";

/// libSQL queue store.
pub struct LibSqlQueueStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    lock: Mutex<()>,
}

impl LibSqlQueueStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Queue database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            lock: Mutex::new(()),
        })
    }

    async fn fetch_status(&self, id: i64) -> Result<Option<ItemStatus>, DatabaseError> {
        let mut rows = self
            .conn
            .query("SELECT status FROM queued_items WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_status: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let status: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Decode(format!("fetch_status: {e}")))?;
                status.parse().map(Some).map_err(DatabaseError::Decode)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("fetch_status: {e}"))),
        }
    }

    async fn query_items(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<QueuedItem>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut items = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => items.push(row_to_item(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
            }
        }
        Ok(items)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so that text comparison orders timestamps.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_item(row: &libsql::Row) -> Result<QueuedItem, DatabaseError> {
    let decode = |e: libsql::Error| DatabaseError::Decode(format!("queued_items row: {e}"));

    let id: i64 = row.get(0).map_err(decode)?;
    let batch_str: String = row.get(1).map_err(decode)?;
    let text: String = row.get(2).map_err(decode)?;
    let tag_str: String = row.get(3).map_err(decode)?;
    let status_str: String = row.get(4).map_err(decode)?;
    let created_str: String = row.get(5).map_err(decode)?;
    let processed_str: Option<String> = row.get(6).ok();
    let last_error: Option<String> = row.get(7).ok();

    let batch_id = Uuid::parse_str(&batch_str)
        .map_err(|e| DatabaseError::Decode(format!("item {id} batch_id: {e}")))?;

    Ok(QueuedItem {
        id,
        batch_id,
        text,
        format_tag: tag_str.parse().map_err(DatabaseError::Decode)?,
        status: status_str.parse().map_err(DatabaseError::Decode)?,
        created_at: parse_datetime(&created_str),
        processed_at: processed_str.as_deref().map(parse_datetime),
        last_error,
    })
}

fn map_insert_error(e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("enqueue_batch: {msg}"))
    } else {
        DatabaseError::Query(format!("enqueue_batch: {msg}"))
    }
}

// ── QueueStore implementation ───────────────────────────────────────

#[async_trait]
impl QueueStore for LibSqlQueueStore {
    async fn enqueue_batch(&self, items: &[NewItem]) -> Result<Vec<QueuedItem>, QueueError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.lock.lock().await;
        let batch_id = Uuid::new_v4();
        let created_at = Utc::now();
        let created_str = format_datetime(created_at);

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue_batch begin: {e}")))?;

        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            let inserted = tx
                .execute(
                    "INSERT INTO queued_items (batch_id, text, format_tag, status, created_at)
                     VALUES (?1, ?2, ?3, 'pending', ?4)",
                    params![
                        batch_id.to_string(),
                        item.text.as_str(),
                        item.format_tag.as_str(),
                        created_str.as_str()
                    ],
                )
                .await;

            if let Err(e) = inserted {
                let err = map_insert_error(e);
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "enqueue_batch rollback failed");
                }
                return Err(err.into());
            }

            stored.push(QueuedItem {
                id: tx.last_insert_rowid(),
                batch_id,
                text: item.text.clone(),
                format_tag: item.format_tag,
                status: ItemStatus::Pending,
                created_at: parse_datetime(&created_str),
                processed_at: None,
                last_error: None,
            });
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue_batch commit: {e}")))?;

        info!(batch_id = %batch_id, count = stored.len(), "Batch enqueued");
        Ok(stored)
    }

    async fn claim_next_pending(&self) -> Result<Option<QueuedItem>, QueueError> {
        let _guard = self.lock.lock().await;
        let now = format_datetime(Utc::now());

        let claimed = self
            .query_items(
                "claim_next_pending",
                &format!(
                    "UPDATE queued_items
                     SET status = 'running', processed_at = ?1, last_error = NULL
                     WHERE id = (
                         SELECT id FROM queued_items
                         WHERE status = 'pending'
                         ORDER BY created_at, id
                         LIMIT 1
                     )
                     RETURNING {ITEM_COLUMNS}"
                ),
                params![now],
            )
            .await?;

        let item = claimed.into_iter().next();
        if let Some(ref item) = item {
            debug!(item_id = item.id, batch_id = %item.batch_id, "Item claimed");
        }
        Ok(item)
    }

    async fn set_status(
        &self,
        id: i64,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;

        let current = self
            .fetch_status(id)
            .await?
            .ok_or(QueueError::NotFound { id })?;

        if !current.can_transition_to(status) {
            return Err(QueueError::ClaimConflict {
                id,
                current,
                target: status,
            });
        }

        let last_error = if status == ItemStatus::Failed { error } else { None };
        let now = format_datetime(Utc::now());

        let changed = self
            .conn
            .execute(
                "UPDATE queued_items
                 SET status = ?1, processed_at = ?2, last_error = ?3
                 WHERE id = ?4 AND status = ?5",
                params![status.as_str(), now, last_error, id, current.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_status: {e}")))?;

        if changed == 0 {
            return Err(QueueError::ClaimConflict {
                id,
                current,
                target: status,
            });
        }

        debug!(item_id = id, status = %status, "Item status updated");
        Ok(())
    }

    async fn list_batch(&self, batch_id: Uuid) -> Result<Vec<QueuedItem>, QueueError> {
        let _guard = self.lock.lock().await;
        let items = self
            .query_items(
                "list_batch",
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM queued_items
                     WHERE batch_id = ?1 ORDER BY created_at, id"
                ),
                params![batch_id.to_string()],
            )
            .await?;
        Ok(items)
    }

    async fn get_item(&self, id: i64) -> Result<Option<QueuedItem>, QueueError> {
        let _guard = self.lock.lock().await;
        let items = self
            .query_items(
                "get_item",
                &format!("SELECT {ITEM_COLUMNS} FROM queued_items WHERE id = ?1"),
                params![id],
            )
            .await?;
        Ok(items.into_iter().next())
    }

    async fn aggregate_status_counts(&self) -> Result<StatusCounts, QueueError> {
        let _guard = self.lock.lock().await;
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM queued_items GROUP BY status",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("aggregate_status_counts: {e}")))?;

        let mut counts = StatusCounts::default();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let status: String = row.get(0).map_err(|e| {
                        DatabaseError::Decode(format!("aggregate_status_counts: {e}"))
                    })?;
                    let n: i64 = row.get(1).map_err(|e| {
                        DatabaseError::Decode(format!("aggregate_status_counts: {e}"))
                    })?;
                    let status: ItemStatus = status.parse().map_err(DatabaseError::Decode)?;
                    counts.add(status, n as usize);
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(
                        DatabaseError::Query(format!("aggregate_status_counts: {e}")).into(),
                    );
                }
            }
        }
        Ok(counts)
    }

    async fn purge_older_than(&self, age: Duration) -> Result<usize, QueueError> {
        let Some(cutoff) = TimeDelta::from_std(age)
            .ok()
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
        else {
            return Ok(0);
        };

        let _guard = self.lock.lock().await;
        let removed = self
            .conn
            .execute(
                "DELETE FROM queued_items
                 WHERE status IN ('complete', 'failed')
                   AND processed_at IS NOT NULL
                   AND processed_at < ?1",
                params![format_datetime(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("purge_older_than: {e}")))?;

        if removed > 0 {
            info!(count = removed, "Purged old queue items");
        }
        Ok(removed as usize)
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<usize, QueueError> {
        let _guard = self.lock.lock().await;
        let now = format_datetime(Utc::now());
        let failed = self
            .conn
            .execute(
                "UPDATE queued_items
                 SET status = 'failed', processed_at = ?1, last_error = ?2
                 WHERE status = 'running'",
                params![now, reason],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fail_interrupted: {e}")))?;

        if failed > 0 {
            warn!(count = failed, "Failed items interrupted by a previous shutdown");
        }
        Ok(failed as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::queue::model::FormatTag;

    async fn test_store() -> LibSqlQueueStore {
        LibSqlQueueStore::new_memory().await.unwrap()
    }

    fn items(texts: &[&str]) -> Vec<NewItem> {
        texts
            .iter()
            .map(|t| NewItem::new(*t, FormatTag::Bullet))
            .collect()
    }

    #[tokio::test]
    async fn enqueue_shares_batch_and_starts_pending() {
        let store = test_store().await;
        let stored = store.enqueue_batch(&items(&["a", "b", "c"])).await.unwrap();

        assert_eq!(stored.len(), 3);
        let batch_id = stored[0].batch_id;
        assert!(stored.iter().all(|i| i.batch_id == batch_id));
        assert!(stored.iter().all(|i| i.status == ItemStatus::Pending));

        let ids: HashSet<i64> = stored.iter().map(|i| i.id).collect();
        assert_eq!(ids.len(), 3);

        let listed = store.list_batch(batch_id).await.unwrap();
        let texts: Vec<_> = listed.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(listed[0].format_tag, FormatTag::Bullet);
    }

    #[tokio::test]
    async fn enqueue_empty_is_noop() {
        let store = test_store().await;
        assert!(store.enqueue_batch(&[]).await.unwrap().is_empty());
        assert_eq!(store.aggregate_status_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn duplicate_text_rolls_back_whole_batch() {
        let store = test_store().await;
        let err = store
            .enqueue_batch(&items(&["a", "b", "a"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            QueueError::Storage(DatabaseError::Constraint(_))
        ));
        assert_eq!(store.aggregate_status_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn same_text_allowed_in_different_batches() {
        let store = test_store().await;
        store.enqueue_batch(&items(&["a"])).await.unwrap();
        store.enqueue_batch(&items(&["a"])).await.unwrap();
        assert_eq!(store.aggregate_status_counts().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn claims_in_submission_order() {
        let store = test_store().await;
        let first = store.enqueue_batch(&items(&["a", "b"])).await.unwrap();
        let second = store.enqueue_batch(&items(&["c"])).await.unwrap();

        let mut claimed = Vec::new();
        while let Some(item) = store.claim_next_pending().await.unwrap() {
            assert_eq!(item.status, ItemStatus::Running);
            assert!(item.processed_at.is_some());
            claimed.push(item.id);
        }

        assert_eq!(claimed, vec![first[0].id, first[1].id, second[0].id]);
        assert_eq!(store.aggregate_status_counts().await.unwrap().running, 3);
    }

    #[tokio::test]
    async fn claim_on_empty_queue_returns_none() {
        let store = test_store().await;
        assert!(store.claim_next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_overlap() {
        let store = Arc::new(test_store().await);
        let texts: Vec<String> = (0..40).map(|i| format!("task {i}")).collect();
        let new_items: Vec<NewItem> = texts
            .iter()
            .map(|t| NewItem::new(t.clone(), FormatTag::Bullet))
            .collect();
        store.enqueue_batch(&new_items).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(item) = store.claim_next_pending().await.unwrap() {
                    mine.push(item.id);
                    tokio::task::yield_now().await;
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: HashSet<i64> = all.iter().copied().collect();
        assert_eq!(all.len(), 40);
        assert_eq!(unique.len(), 40);
    }

    #[tokio::test]
    async fn set_status_follows_state_machine() {
        let store = test_store().await;
        let stored = store.enqueue_batch(&items(&["a"])).await.unwrap();
        let id = stored[0].id;

        let err = store
            .set_status(id, ItemStatus::Complete, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::ClaimConflict {
                current: ItemStatus::Pending,
                target: ItemStatus::Complete,
                ..
            }
        ));

        store.claim_next_pending().await.unwrap().unwrap();
        store
            .set_status(id, ItemStatus::Failed, Some("Save failed"))
            .await
            .unwrap();

        let item = store.get_item(id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.last_error.as_deref(), Some("Save failed"));

        let err = store
            .set_status(id, ItemStatus::Complete, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::ClaimConflict { .. }));
    }

    #[tokio::test]
    async fn complete_clears_error() {
        let store = test_store().await;
        let stored = store.enqueue_batch(&items(&["a"])).await.unwrap();
        store.claim_next_pending().await.unwrap();
        store
            .set_status(stored[0].id, ItemStatus::Complete, Some("ignored"))
            .await
            .unwrap();

        let item = store.get_item(stored[0].id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Complete);
        assert!(item.last_error.is_none());
    }

    #[tokio::test]
    async fn set_status_unknown_id() {
        let store = test_store().await;
        let err = store
            .set_status(999, ItemStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound { id: 999 }));
        assert!(store.get_item(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_items() {
        let store = test_store().await;
        let done = store.enqueue_batch(&items(&["done", "broken"])).await.unwrap();
        store.claim_next_pending().await.unwrap();
        store.claim_next_pending().await.unwrap();
        store
            .set_status(done[0].id, ItemStatus::Complete, None)
            .await
            .unwrap();
        store
            .set_status(done[1].id, ItemStatus::Failed, Some("x"))
            .await
            .unwrap();

        let running = store.enqueue_batch(&items(&["running"])).await.unwrap();
        store.enqueue_batch(&items(&["pending"])).await.unwrap();
        let claimed = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.id, running[0].id);

        tokio::time::sleep(Duration::from_millis(5)).await;

        // Long retention keeps everything.
        assert_eq!(
            store
                .purge_older_than(Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );

        let removed = store.purge_older_than(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 2);

        let counts = store.aggregate_status_counts().await.unwrap();
        assert_eq!(counts.complete + counts.failed, 0);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn purge_with_huge_age_is_noop() {
        let store = test_store().await;
        assert_eq!(store.purge_older_than(Duration::MAX).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fail_interrupted_moves_running_to_failed() {
        let store = test_store().await;
        let stored = store.enqueue_batch(&items(&["a", "b"])).await.unwrap();
        store.claim_next_pending().await.unwrap();

        let n = store.fail_interrupted("interrupted by restart").await.unwrap();
        assert_eq!(n, 1);

        let first = store.get_item(stored[0].id).await.unwrap().unwrap();
        assert_eq!(first.status, ItemStatus::Failed);
        assert_eq!(first.last_error.as_deref(), Some("interrupted by restart"));

        let second = store.get_item(stored[1].id).await.unwrap().unwrap();
        assert_eq!(second.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn local_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let batch_id = {
            let store = LibSqlQueueStore::new_local(&path).await.unwrap();
            store.enqueue_batch(&items(&["persisted"])).await.unwrap()[0].batch_id
        };

        let store = LibSqlQueueStore::new_local(&path).await.unwrap();
        let listed = store.list_batch(batch_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "persisted");
    }
}
