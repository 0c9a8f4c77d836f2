//! libSQL-backed [`super::OfflineQueueStore`], grounded on the connection
//! and row-mapping style of the teacher's `db/libsql_backend.rs` and
//! `db/libsql/jobs.rs` (explicit column lists, `params![...]`, a single
//! `Database` handle shared behind an `Arc`).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Database, params};

use crate::domain::Task;
use crate::error::{DatabaseError, QueueError};
use crate::queue::{OfflineQueueStore, QueueItem, QueueStatus};

const QUEUE_COLUMNS: &str =
    "id, task_json, role, source, priority, status, retry_count, error, created_at, updated_at";

/// `offline_queue` table schema (spec §6):
/// `id, task_json, role, source, priority, status, retry_count, error, created_at, updated_at`.
const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS offline_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_json TEXT NOT NULL,
    role TEXT,
    source TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub struct LibSqlQueueStore {
    db: Arc<Database>,
    /// Serializes writes behind a single in-process lock, matching the
    /// spec's "writes serialize behind a process-wide mutex" concurrency
    /// note for single-connection-transaction backends.
    write_lock: tokio::sync::Mutex<()>,
}

impl LibSqlQueueStore {
    pub async fn open_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Pool(format!("failed to create queue dir: {e}")))?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open libSQL database: {e}")))?;
        let store = Self {
            db: Arc::new(db),
            write_lock: tokio::sync::Mutex::new(()),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn open_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open in-memory database: {e}")))?;
        let store = Self {
            db: Arc::new(db),
            write_lock: tokio::sync::Mutex::new(()),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), DatabaseError> {
        let conn = self.connect()?;
        conn.execute(CREATE_TABLE, ())
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }

    fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db
            .connect()
            .map_err(|e| DatabaseError::Pool(e.to_string()))
    }

    fn row_to_item(row: &libsql::Row) -> Result<QueueItem, QueueError> {
        let task_json: String = row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?;
        let task: Task = serde_json::from_str(&task_json)?;
        let status_str: String = row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?;
        let created_at: String = row.get(8).map_err(|e| DatabaseError::Query(e.to_string()))?;
        let updated_at: String = row.get(9).map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(QueueItem {
            id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
            task,
            role: row.get::<Option<String>>(2).unwrap_or(None),
            source: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
            priority: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
            status: parse_status(&status_str),
            retry_count: row
                .get::<i64>(6)
                .map_err(|e| DatabaseError::Query(e.to_string()))? as u32,
            error: row.get::<Option<String>>(7).unwrap_or(None),
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }
}

fn status_str(status: QueueStatus) -> &'static str {
    match status {
        QueueStatus::Pending => "pending",
        QueueStatus::Processing => "processing",
        QueueStatus::Failed => "failed",
        QueueStatus::Expired => "expired",
    }
}

fn parse_status(raw: &str) -> QueueStatus {
    match raw {
        "processing" => QueueStatus::Processing,
        "failed" => QueueStatus::Failed,
        "expired" => QueueStatus::Expired,
        _ => QueueStatus::Pending,
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl OfflineQueueStore for LibSqlQueueStore {
    async fn enqueue(
        &self,
        task: &Task,
        role: Option<&str>,
        priority: i32,
    ) -> Result<i64, QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;
        let now = fmt_ts(&Utc::now());
        let task_json = serde_json::to_string(task)?;

        conn.execute(
            "INSERT INTO offline_queue (task_json, role, source, priority, status, retry_count, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
            params![task_json, role.map(str::to_string), task.source.clone(), priority as i64, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let id = conn.last_insert_rowid();
        Ok(id)
    }

    async fn dequeue_next(&self) -> Result<Option<QueueItem>, QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM offline_queue \
                     WHERE status = 'pending' ORDER BY priority DESC, id ASC LIMIT 1"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        else {
            return Ok(None);
        };
        let item = Self::row_to_item(&row)?;

        conn.execute(
            "UPDATE offline_queue SET status = 'processing', updated_at = ?2 WHERE id = ?1",
            params![item.id, fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(Some(QueueItem {
            status: QueueStatus::Processing,
            ..item
        }))
    }

    async fn cleanup_expired(&self, ttl: std::time::Duration) -> Result<u64, QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;
        let cutoff = fmt_ts(&(Utc::now() - chrono::Duration::from_std(ttl).unwrap_or_default()));

        conn.execute(
            "UPDATE offline_queue SET status = 'expired', updated_at = ?2 \
             WHERE status = 'pending' AND created_at < ?1",
            params![cutoff, fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(conn.changes())
    }

    async fn is_full(&self, max: usize) -> Result<bool, QueueError> {
        Ok(self.count_pending().await? >= max)
    }

    async fn count_pending(&self) -> Result<usize, QueueError> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM offline_queue WHERE status = 'pending'",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .expect("COUNT(*) always returns one row");
        let count: i64 = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(count as usize)
    }

    async fn update_status(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;
        conn.execute(
            "UPDATE offline_queue SET status = ?2, error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status_str(status), error.map(str::to_string), fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn increment_retry(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;
        conn.execute(
            "UPDATE offline_queue SET status = ?2, error = ?3, retry_count = retry_count + 1, updated_at = ?4 \
             WHERE id = ?1",
            params![id, status_str(status), error.map(str::to_string), fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;
        conn.execute("DELETE FROM offline_queue WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn recover_stale(&self) -> Result<u64, QueueError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connect()?;
        conn.execute(
            "UPDATE offline_queue SET status = 'pending', updated_at = ?1 WHERE status = 'processing'",
            params![fmt_ts(&Utc::now())],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(conn.changes())
    }
}
