//! Per-task execution context threaded through provider calls and tool
//! handlers.
//!
//! Kept deliberately small: the spec's data model notes that in-memory
//! ownership is strictly tree-shaped (a [`crate::domain::Task`] owns its
//! transcript; a session is referenced only by id). `JobContext` is that
//! per-task handle — it carries the identifiers and the cancellation
//! signal a handler needs, never a back-reference into the coordinator.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::PermissionMode;

/// Cooperative cancellation signal for one task's lifetime. Cloning shares
/// the same underlying channel; `cancel()` is idempotent.
#[derive(Clone)]
pub struct Cancellation {
    tx: std::sync::Arc<tokio::sync::watch::Sender<bool>>,
    rx: tokio::sync::watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Context passed to a [`crate::tools::Handler`] and to provider calls for
/// one task's duration.
#[derive(Clone)]
pub struct JobContext {
    pub task_id: Uuid,
    /// Correlation id for log lines spanning one dispatch, injected by the
    /// [`crate::coordinator::DispatchCoordinator`] (spec §4.I).
    pub trace_id: Uuid,
    pub role: Option<String>,
    pub permission_mode: PermissionMode,
    pub budget_usd: Decimal,
    pub cancellation: Cancellation,
}

impl JobContext {
    pub fn for_task(task: &crate::domain::Task) -> Self {
        Self {
            task_id: task.id,
            trace_id: Uuid::new_v4(),
            role: task.role.clone(),
            permission_mode: task.permission_mode,
            budget_usd: task.budget_usd,
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }
}
