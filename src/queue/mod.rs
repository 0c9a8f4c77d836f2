//! Offline queue (spec module 4.D): durable pending-task store with
//! priority ordering and TTL-based expiry. The policy of *when* to enqueue
//! (all candidates transiently unavailable) belongs to the dispatch
//! coordinator/executor, not this module — see spec §4.D.

pub mod libsql_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Task;
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub task: Task,
    pub role: Option<String>,
    pub source: String,
    pub priority: i32,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable store backing the offline queue. One implementation
/// ([`libsql_store::LibSqlQueueStore`]) is provided; the trait exists so
/// the coordinator doesn't depend on the concrete backend.
#[async_trait]
pub trait OfflineQueueStore: Send + Sync {
    async fn enqueue(
        &self,
        task: &Task,
        role: Option<&str>,
        priority: i32,
    ) -> Result<i64, QueueError>;

    /// Atomically selects the oldest pending item with the highest
    /// priority (ties broken by insertion order) and marks it
    /// `processing`.
    async fn dequeue_next(&self) -> Result<Option<QueueItem>, QueueError>;

    async fn cleanup_expired(&self, ttl: std::time::Duration) -> Result<u64, QueueError>;

    async fn is_full(&self, max: usize) -> Result<bool, QueueError>;

    async fn count_pending(&self) -> Result<usize, QueueError>;

    async fn update_status(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError>;

    async fn increment_retry(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError>;

    async fn delete(&self, id: i64) -> Result<(), QueueError>;

    /// Startup recovery scan: any item left `processing` by a prior process
    /// (crash, kill -9) is reset to `pending` so it's picked up again.
    async fn recover_stale(&self) -> Result<u64, QueueError>;
}

/// Fixed keyword set recognizing a transient error (spec §4.D). Kept as a
/// thin re-export of [`crate::error::is_transient_text`] so this module's
/// own docs/tests can reference it without importing from `error`
/// directly.
pub fn is_transient_error(text: &str) -> bool {
    crate::error::is_transient_text(text)
}

#[cfg(test)]
mod transient_tests {
    use super::*;

    #[test]
    fn recognizes_documented_transient_markers() {
        for text in [
            "Connection refused",
            "request timed out",
            "deadline exceeded while waiting",
            "unexpected EOF",
            "broken pipe",
            "connection reset by peer",
            "502 bad gateway",
            "503 service unavailable",
            "too many requests",
            "rate limit exceeded",
        ] {
            assert!(is_transient_error(text), "expected transient: {text}");
        }
    }

    #[test]
    fn non_transient_errors_are_not_matched() {
        for text in [
            "invalid api key",
            "model not found",
            "permission denied",
            "content policy violation",
            "bad request: missing field",
        ] {
            assert!(!is_transient_error(text), "expected non-transient: {text}");
        }
    }
}
