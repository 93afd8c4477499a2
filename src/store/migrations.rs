//! Version-tracked database migrations for the libSQL queue store.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "queued_items",
        sql: r#"
            CREATE TABLE IF NOT EXISTS queued_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL,
                text TEXT NOT NULL,
                format_tag TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'running', 'complete', 'failed')),
                created_at TEXT NOT NULL,
                processed_at TEXT,
                last_error TEXT,
                UNIQUE (batch_id, text)
            );
            CREATE INDEX IF NOT EXISTS idx_queued_items_status ON queued_items(status);
            CREATE INDEX IF NOT EXISTS idx_queued_items_batch ON queued_items(batch_id);
        "#,
    },
    Migration {
        version: 2,
        name: "claim_and_retention_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_queued_items_claim
                ON queued_items(status, created_at, id);
            CREATE INDEX IF NOT EXISTS idx_queued_items_processed
                ON queued_items(processed_at);
        "#,
    },
];

/// Create the `_migrations` table and apply every migration newer than the
/// recorded version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    async fn count(conn: &Connection, sql: &str) -> i64 {
        let mut rows = conn.query(sql, ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        row.get(0).unwrap()
    }

    #[tokio::test]
    async fn migrations_create_queue_table() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in ["queued_items", "_migrations"] {
            let n = count(
                &conn,
                &format!("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='{table}'"),
            )
            .await;
            assert_eq!(n, 1, "Table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM _migrations").await,
            MIGRATIONS.len() as i64
        );
    }

    #[tokio::test]
    async fn batch_text_pair_is_unique() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let insert = "INSERT INTO queued_items (batch_id, text, format_tag, created_at) \
                      VALUES ('b1', 'same', 'single', '2026-01-01T00:00:00.000000Z')";
        conn.execute(insert, ()).await.unwrap();
        assert!(conn.execute(insert, ()).await.is_err());

        conn.execute(
            "INSERT INTO queued_items (batch_id, text, format_tag, created_at) \
             VALUES ('b2', 'same', 'single', '2026-01-01T00:00:00.000000Z')",
            (),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let result = conn
            .execute(
                "INSERT INTO queued_items (batch_id, text, format_tag, status, created_at) \
                 VALUES ('b1', 'x', 'single', 'done', '2026-01-01T00:00:00.000000Z')",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
