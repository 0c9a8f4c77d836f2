//! Post-execution self-evaluation and reward feedback (spec module 4.J).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ReflectionConfig;
use crate::domain::{PermissionMode, Task, TaskResult, TaskStatus};
use crate::error::ReflectionError;

const MAX_PROMPT_CHARS: usize = 500;
const MAX_OUTPUT_CHARS: usize = 1000;

/// Whether `performReflection` should run for this (task, result) pair.
pub fn should_reflect(config: &ReflectionConfig, task: &Task, result: &TaskResult) -> bool {
    if !config.enabled {
        return false;
    }
    let Some(role) = task.role.as_deref() else {
        return false;
    };
    if role.is_empty() {
        return false;
    }

    match result.status {
        TaskStatus::Success => result.cost_usd >= config.min_cost,
        TaskStatus::Error | TaskStatus::Timeout => config.trigger_on_fail,
        TaskStatus::Queued | TaskStatus::Cancelled => false,
    }
}

/// Builds the cheap follow-up `Task` that asks a model to self-evaluate the
/// just-finished task. Carries no tools; a plain completion call suffices.
pub fn build_reflection_task(cheap_model: Option<&str>, config: &ReflectionConfig, task: &Task, result: &TaskResult) -> Task {
    let prompt_excerpt = truncate(&task.prompt, MAX_PROMPT_CHARS);
    let output_excerpt = truncate(result.output.as_deref().unwrap_or(""), MAX_OUTPUT_CHARS);

    let prompt = format!(
        "Evaluate the following exchange and respond with strict JSON \
         {{\"score\": 1-5, \"feedback\": \"...\", \"improvement\": \"...\"}}.\n\n\
         User prompt:\n{prompt_excerpt}\n\nAssistant output:\n{output_excerpt}"
    );

    let mut reflection_task = Task::new(prompt, "reflection");
    reflection_task.role = task.role.clone();
    reflection_task.model_hint = cheap_model.map(str::to_string);
    reflection_task.budget_usd = config.budget_usd;
    reflection_task.permission_mode = PermissionMode::Plan;
    reflection_task.parent_task_id = Some(task.id);
    reflection_task
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawReflection {
    score: i32,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    improvement: String,
}

/// Strips markdown code fences, locates the first balanced `{...}` object,
/// and parses it. Tolerant of surrounding prose the way a chat-tuned model
/// tends to wrap JSON in.
fn extract_json_object(text: &str) -> Result<RawReflection, ReflectionError> {
    let cleaned = text.replace("```json", "```");
    let without_fences = cleaned.replace("```", "");

    let start = without_fences.find('{').ok_or(ReflectionError::UnparsableOutput)?;
    let bytes = without_fences.as_bytes();
    let mut depth = 0i32;
    let mut end = None;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end.ok_or(ReflectionError::UnparsableOutput)?;
    let candidate = &without_fences[start..=end];
    serde_json::from_str(candidate).map_err(|_| ReflectionError::UnparsableOutput)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub id: i64,
    pub task_id: Uuid,
    pub role: String,
    pub score: i32,
    pub feedback: String,
    pub improvement: String,
    pub cost_usd: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Durable store for `reflections(id, task_id, agent, score, feedback,
/// improvement, cost_usd, created_at)`, indexed by agent (spec §6).
#[async_trait::async_trait]
pub trait ReflectionStore: Send + Sync {
    async fn insert(
        &self,
        task_id: Uuid,
        role: &str,
        score: i32,
        feedback: &str,
        improvement: &str,
        cost_usd: Decimal,
    ) -> Result<i64, ReflectionError>;

    async fn recent_for_role(&self, role: &str, limit: usize) -> Result<Vec<ReflectionRecord>, ReflectionError>;
}

/// Parses a model's reflection output and persists it, returning the
/// inserted record. The caller is responsible for invoking this only after
/// [`should_reflect`] and for supplying the reflection task's own cost.
pub async fn record_reflection(
    store: &dyn ReflectionStore,
    task_id: Uuid,
    role: &str,
    model_output: &str,
    cost_usd: Decimal,
) -> Result<ReflectionRecord, ReflectionError> {
    let raw = extract_json_object(model_output)?;
    if !(1..=5).contains(&raw.score) {
        return Err(ReflectionError::ScoreOutOfRange(raw.score));
    }

    let id = store
        .insert(task_id, role, raw.score, &raw.feedback, &raw.improvement, cost_usd)
        .await?;

    Ok(ReflectionRecord {
        id,
        task_id,
        role: role.to_string(),
        score: raw.score,
        feedback: raw.feedback,
        improvement: raw.improvement,
        cost_usd,
        created_at: Utc::now(),
    })
}

/// Renders recent reflections for `role` as a short text block a task
/// prompt may be prefixed with.
pub async fn build_reflection_context(
    store: &dyn ReflectionStore,
    role: &str,
    limit: usize,
) -> Result<String, ReflectionError> {
    let records = store.recent_for_role(role, limit).await?;
    if records.is_empty() {
        return Ok(String::new());
    }

    let mut block = String::from("Recent self-evaluations:\n");
    for record in records {
        block.push_str(&format!(
            "- score {}/5: {} (try: {})\n",
            record.score, record.feedback, record.improvement
        ));
    }
    Ok(block)
}
