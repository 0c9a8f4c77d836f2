//! Core data model shared across the dispatch pipeline: [`Task`], the
//! provider wire types, and tool call/result shapes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How much latitude the executor gives a task to act without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// The agent may only read/inspect; no tool with side effects executes.
    Plan,
    /// Ordinary run: policy/trust/approval gates apply as configured.
    Default,
    /// All tool calls for this task run without approval prompts.
    AcceptEdits,
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::Default
    }
}

/// A unit of work accepted from an ingress channel.
///
/// Immutable once submitted. Only the [`crate::coordinator::DispatchCoordinator`]
/// may produce a modified copy (via [`Task::with_defaults`]), and it does so
/// by cloning into a new value rather than mutating the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: Option<String>,
    pub source: String,
    pub role: Option<String>,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub provider_hint: Option<String>,
    pub model_hint: Option<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub permission_mode: PermissionMode,
    pub budget_usd: Decimal,
    pub session_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
}

impl Task {
    /// Default per-task timeout when a channel adapter doesn't supply one.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Build a minimal task; callers fill in optional fields with setters.
    pub fn new(prompt: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            source: source.into(),
            role: None,
            prompt: prompt.into(),
            system_prompt: None,
            provider_hint: None,
            model_hint: None,
            timeout: Self::DEFAULT_TIMEOUT,
            permission_mode: PermissionMode::Default,
            budget_usd: Decimal::ZERO,
            session_id: None,
            parent_task_id: None,
        }
    }

    /// Fill any unset fields from config-provided defaults. Returns a new
    /// `Task`; the original (as submitted by the adapter) is left intact.
    pub fn with_defaults(
        mut self,
        default_timeout: Duration,
        default_budget: Decimal,
    ) -> Self {
        if self.timeout.is_zero() {
            self.timeout = default_timeout;
        }
        if self.budget_usd.is_zero() {
            self.budget_usd = default_budget;
        }
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A single prior turn in the running transcript the executor builds up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// The uniform request the executor hands to any provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tool_defs: Vec<ToolDefSpec>,
    /// Overrides the provider's configured default model, sourced from
    /// [`Task::model_hint`] (itself filled from `RoleEntry.model` or
    /// `ReflectionConfig.cheap_model` by the time it reaches a provider).
    pub model: Option<String>,
    pub token_hint: Option<u32>,
    pub cost_hint: Option<Decimal>,
}

/// Advertised tool shape a provider needs to offer function calling, a
/// trimmed view of [`crate::tools::ToolDef`] (no handler, no domain/trust
/// fields) since that's all the wire format requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How a [`ProviderResult`] ended. Matches the spec's closed set; any other
/// provider-specific string is carried in [`StopReason::Other`] and is the
/// only variant the transient-error matcher inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Refusal,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub output: String,
    pub stop_reason: StopReason,
    pub tool_calls: Vec<ToolCall>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Terminal disposition of a [`Task`] once the executor stops iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Error,
    Queued,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub cost_usd: Decimal,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub output_file: Option<String>,
    pub role: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task: &Task, output: impl Into<String>) -> Self {
        Self {
            task_id: task.id,
            status: TaskStatus::Success,
            output: Some(output.into()),
            error: None,
            cost_usd: Decimal::ZERO,
            tokens_in: 0,
            tokens_out: 0,
            output_file: None,
            role: task.role.clone(),
            completed_at: Utc::now(),
        }
    }

    pub fn error(task: &Task, status: TaskStatus, error: impl Into<String>) -> Self {
        Self {
            task_id: task.id,
            status,
            output: None,
            error: Some(error.into()),
            cost_usd: Decimal::ZERO,
            tokens_in: 0,
            tokens_out: 0,
            output_file: None,
            role: task.role.clone(),
            completed_at: Utc::now(),
        }
    }
}
