//! Human-in-the-loop approval gate (spec module 4.G).

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApprovalError;

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool_name: String,
    pub summary: String,
    pub role: Option<String>,
}

/// `(ctx, ApprovalRequest) -> (approved, err)`. Implementations talk to
/// whatever out-of-band channel surfaces the prompt to a human (chat DM,
/// web UI); this core only defines the contract and the in-process
/// auto-approve memory.
#[async_trait]
pub trait ApprovalBackend: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, ApprovalError>;
}

/// Human-readable outcome classification for logging: "approved",
/// "rejected by user", or the error text.
pub fn gate_reason(result: &Result<bool, ApprovalError>) -> String {
    match result {
        Ok(true) => "approved".to_string(),
        Ok(false) => "rejected by user".to_string(),
        Err(e) => e.to_string(),
    }
}

/// Per-tool-name auto-approve memory for the remainder of a task. Distinct
/// from `Tools.TrustOverride` (config-level, cross-task): this is set at
/// runtime when a gate signals "auto-approve this tool" and only lives for
/// one [`crate::executor::AgenticLoopExecutor`] run.
#[derive(Default)]
pub struct AutoApproveMemory {
    tools: Mutex<HashSet<String>>,
}

impl AutoApproveMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_auto_approved(&self, tool: &str) -> bool {
        self.tools.lock().expect("auto-approve mutex poisoned").contains(tool)
    }

    pub fn remember(&self, tool: &str) {
        self.tools
            .lock()
            .expect("auto-approve mutex poisoned")
            .insert(tool.to_string());
    }
}

/// Tool-specific summary formatters, default "Execute `<tool>`" for tools
/// without a bespoke formatter (spec §4.G names `exec`/`write`/
/// `email_send` as the motivating examples).
pub fn summarize_tool_call(tool_name: &str, input: &Value) -> String {
    match tool_name {
        "exec" => format!(
            "Run shell command: {}",
            input.get("command").and_then(Value::as_str).unwrap_or("<unknown command>")
        ),
        "file_write" | "write" => format!(
            "Write to file: {}",
            input.get("path").and_then(Value::as_str).unwrap_or("<unknown path>")
        ),
        "email_send" => format!(
            "Send email to {}: {}",
            input.get("to").and_then(Value::as_str).unwrap_or("<unknown recipient>"),
            input.get("subject").and_then(Value::as_str).unwrap_or("(no subject)"),
        ),
        other => format!("Execute {other}"),
    }
}

/// Lets an `Arc<dyn ApprovalBackend>` stand in for a concrete backend type,
/// so [`ApprovalGate`] can be named as `ApprovalGate<Arc<dyn ApprovalBackend>>`
/// by callers (the executor, the coordinator) that assemble the backend at
/// runtime and don't want the generic parameter to propagate.
#[async_trait]
impl ApprovalBackend for std::sync::Arc<dyn ApprovalBackend> {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, ApprovalError> {
        (**self).request_approval(request).await
    }
}

/// The gate a role's policy consults before any out-of-band approval RPC.
pub struct ApprovalGate<B: ApprovalBackend> {
    backend: B,
    auto_approve: AutoApproveMemory,
    config_auto_approve_tools: HashSet<String>,
}

impl<B: ApprovalBackend> ApprovalGate<B> {
    pub fn new(backend: B, config_auto_approve_tools: HashSet<String>) -> Self {
        Self {
            backend,
            auto_approve: AutoApproveMemory::new(),
            config_auto_approve_tools,
        }
    }

    pub fn is_auto_approved(&self, tool: &str) -> bool {
        self.config_auto_approve_tools.contains(tool) || self.auto_approve.is_auto_approved(tool)
    }

    pub fn remember_auto_approval(&self, tool: &str) {
        self.auto_approve.remember(tool);
    }

    /// Consults `is_auto_approved` first; only calls the backend when
    /// necessary. Context cancellation is the caller's responsibility
    /// (wrap with `tokio::time::timeout` / `tokio::select!` against the
    /// task's [`crate::context::Cancellation`]).
    pub async fn request(
        &self,
        tool_name: &str,
        input: &Value,
        role: Option<&str>,
    ) -> Result<bool, ApprovalError> {
        if self.is_auto_approved(tool_name) {
            return Ok(true);
        }
        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.to_string(),
            summary: summarize_tool_call(tool_name, input),
            role: role.map(str::to_string),
        };
        self.backend.request_approval(request).await
    }
}
