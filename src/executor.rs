//! Agentic Loop Executor (spec module 4.H) — the model/tool round-trip
//! driver. This is the heart of the dispatch core: everything else in this
//! crate exists to be consulted from inside `run()`.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::approval::{gate_reason, ApprovalBackend, ApprovalGate};
use crate::circuit::CircuitRegistry;
use crate::config::Config;
use crate::context::JobContext;
use crate::domain::{
    Message, MessageRole, ProviderRequest, StopReason, Task, TaskResult, TaskStatus, ToolCall,
    ToolDefSpec, ToolResult,
};
use crate::error::ProviderError;
use crate::loop_detector::{LoopDetector, LoopDetectorConfig};
use crate::notify::{NotificationEngine, NotifyMessage, Priority};
use crate::provider::candidate::CandidateBuilder;
use crate::provider::cooldown::CooldownTracker;
use crate::provider::retry::{RetryConfig, RetryProvider};
use crate::provider::{Provider, ProviderRegistry};
use crate::queue::OfflineQueueStore;
use crate::tools::policy::{PolicyResolver, RolePolicy, TrustLevel};
use crate::tools::ToolRegistry;

/// Hard iteration cap (spec §4.H). Reaching it without `end_turn` is a
/// terminal error, not a silent truncation.
pub const MAX_ITERATIONS: usize = 25;

/// Output truncation cap for a single tool result (spec §4.H.6.f names 20
/// KiB as an example; kept as the default here).
pub const TOOL_OUTPUT_TRUNCATE_BYTES: usize = 20 * 1024;

/// Everything the executor needs to run a task, assembled once by whatever
/// wires up the process (normally the [`crate::coordinator::DispatchCoordinator`]).
pub struct ExecutorDeps {
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub circuits: Arc<CircuitRegistry>,
    pub cooldown: Arc<CooldownTracker>,
    pub queue: Option<Arc<dyn OfflineQueueStore>>,
    pub policy: Arc<PolicyResolver>,
    pub approval: Option<Arc<ApprovalGate<Arc<dyn ApprovalBackend>>>>,
    pub notify: Option<Arc<NotificationEngine>>,
}

pub struct AgenticLoopExecutor {
    deps: ExecutorDeps,
}

enum CandidateWalkOutcome {
    Success { provider: String, result: crate::domain::ProviderResult },
    AllUnavailable,
    NonTransient(String),
}

impl AgenticLoopExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    pub async fn run(&self, task: Task, role_id: Option<&str>, ctx: &JobContext) -> TaskResult {
        let role = role_id.and_then(|id| self.deps.config.roles.get(id));
        let policy = role_policy(role);

        let candidates = match CandidateBuilder::build(&self.deps.config, &task, role_id) {
            Ok(c) => c,
            Err(e) => return TaskResult::error(&task, TaskStatus::Error, e.to_string()),
        };

        let mut transcript: Vec<Message> = vec![Message {
            role: MessageRole::User,
            content: task.prompt.clone(),
            tool_calls: vec![],
            tool_results: vec![],
        }];

        let mut loop_detector = LoopDetector::new(LoopDetectorConfig::default());
        let mut total_tokens_in: u32 = 0;
        let mut total_tokens_out: u32 = 0;
        let mut total_cost = Decimal::ZERO;

        for iteration in 0..MAX_ITERATIONS {
            if ctx.cancellation.is_cancelled() {
                return TaskResult::error(&task, TaskStatus::Cancelled, "task cancelled");
            }

            let allowed_tools = self.deps.policy.effective_allowed(&self.deps.tools, &policy).await;
            let tool_defs = self.tool_defs_for(&allowed_tools).await;
            let request = ProviderRequest {
                prompt: task.prompt.clone(),
                system_prompt: resolve_system_prompt(role, &task),
                messages: transcript.clone(),
                tool_defs,
                model: task.model_hint.clone(),
                token_hint: None,
                cost_hint: None,
            };

            debug!(task_id = %task.id, iteration, candidates = ?candidates, "executor iteration start");

            let outcome = self.walk_candidates(&candidates, request).await;

            let (provider_name, result) = match outcome {
                CandidateWalkOutcome::Success { provider, result } => (provider, result),
                CandidateWalkOutcome::NonTransient(message) => {
                    return TaskResult::error(&task, TaskStatus::Error, message);
                }
                CandidateWalkOutcome::AllUnavailable => {
                    return self.defer_or_fail(&task).await;
                }
            };

            total_tokens_in += result.tokens_in;
            total_tokens_out += result.tokens_out;
            total_cost += result.cost_usd;
            if total_cost >= task.budget_usd && task.budget_usd > Decimal::ZERO {
                warn!(task_id = %task.id, cost = %total_cost, budget = %task.budget_usd, "task cost at or above budget");
            }

            if result.stop_reason != StopReason::ToolUse {
                info!(task_id = %task.id, provider = %provider_name, "executor loop ended with end_turn");
                let mut task_result = TaskResult::success(&task, result.output);
                task_result.cost_usd = total_cost;
                task_result.tokens_in = total_tokens_in;
                task_result.tokens_out = total_tokens_out;
                return task_result;
            }

            let mut tool_results = Vec::with_capacity(result.tool_calls.len());
            let mut loop_detected = None;

            for call in &result.tool_calls {
                match self
                    .handle_tool_call(call, &allowed_tools, &policy, &task, ctx, &mut loop_detector)
                    .await
                {
                    ToolCallOutcome::Result(tool_result) => tool_results.push(tool_result),
                    ToolCallOutcome::LoopDetected(message) => {
                        tool_results.push(ToolResult::error(call.id.clone(), message.clone()));
                        loop_detected = Some(message);
                        break;
                    }
                }
            }

            transcript.push(Message {
                role: MessageRole::Assistant,
                content: result.output,
                tool_calls: result.tool_calls,
                tool_results: vec![],
            });
            transcript.push(Message {
                role: MessageRole::User,
                content: String::new(),
                tool_calls: vec![],
                tool_results,
            });

            if let Some(message) = loop_detected {
                warn!(task_id = %task.id, "loop detector aborted task");
                if let Some(notify) = &self.deps.notify {
                    let _ = notify
                        .notify(NotifyMessage {
                            text: format!("task {} aborted: {message}", task.id),
                            priority: Priority::High,
                            event_type: "loop_detected".to_string(),
                            role: task.role.clone(),
                        })
                        .await;
                }
                let mut task_result = TaskResult::error(&task, TaskStatus::Error, "loop detected");
                task_result.cost_usd = total_cost;
                task_result.tokens_in = total_tokens_in;
                task_result.tokens_out = total_tokens_out;
                return task_result;
            }
        }

        let mut task_result = TaskResult::error(&task, TaskStatus::Error, "max iterations");
        task_result.cost_usd = total_cost;
        task_result.tokens_in = total_tokens_in;
        task_result.tokens_out = total_tokens_out;
        task_result
    }

    async fn tool_defs_for(&self, allowed: &std::collections::HashSet<String>) -> Vec<ToolDefSpec> {
        let mut defs = Vec::with_capacity(allowed.len());
        for name in allowed {
            if let Some(def) = self.deps.tools.get(name).await {
                defs.push(ToolDefSpec {
                    name: def.name,
                    description: def.description,
                    parameters: def.schema,
                });
            }
        }
        defs
    }

    async fn walk_candidates(&self, candidates: &[String], request: ProviderRequest) -> CandidateWalkOutcome {
        for name in candidates {
            if self.deps.cooldown.is_cooling(name) {
                continue;
            }
            let circuit = self.deps.circuits.get_or_create(name).await;
            if !circuit.allow() {
                continue;
            }
            let Some(provider) = self.deps.providers.get(name).await else {
                continue;
            };

            let retry_attempts = self.deps.config.providers.retry_attempts;
            let outcome = if retry_attempts > 0 {
                let retrying = RetryProvider::new(provider, RetryConfig { max_retries: retry_attempts });
                retrying.execute_with_tools(request.clone()).await
            } else {
                provider.execute_with_tools(request.clone()).await
            };

            match outcome {
                Ok(result) => {
                    circuit.record_success();
                    self.deps.cooldown.record_success(name);
                    return CandidateWalkOutcome::Success {
                        provider: name.clone(),
                        result,
                    };
                }
                Err(err) => {
                    circuit.record_failure();
                    self.deps.cooldown.record_failure(name);
                    if is_transient(&err) {
                        warn!(provider = %name, error = %err, "transient provider failure, trying next candidate");
                        continue;
                    }
                    return CandidateWalkOutcome::NonTransient(err.to_string());
                }
            }
        }
        CandidateWalkOutcome::AllUnavailable
    }

    async fn defer_or_fail(&self, task: &Task) -> TaskResult {
        let Some(queue) = &self.deps.queue else {
            return TaskResult::error(task, TaskStatus::Error, "all providers unavailable");
        };

        match queue.is_full(self.deps.config.offline_queue.max_items).await {
            Ok(true) | Err(_) => TaskResult::error(task, TaskStatus::Error, "all providers unavailable"),
            Ok(false) => {
                let priority = 0;
                match queue.enqueue(task, task.role.as_deref(), priority).await {
                    Ok(_) => {
                        info!(task_id = %task.id, "all providers unavailable, enqueued task");
                        TaskResult::error(task, TaskStatus::Queued, "queued: all providers unavailable")
                    }
                    Err(e) => TaskResult::error(task, TaskStatus::Error, e.to_string()),
                }
            }
        }
    }

    async fn handle_tool_call(
        &self,
        call: &ToolCall,
        allowed: &std::collections::HashSet<String>,
        policy: &RolePolicy,
        task: &Task,
        ctx: &JobContext,
        loop_detector: &mut LoopDetector,
    ) -> ToolCallOutcome {
        if !allowed.contains(&call.name) {
            return ToolCallOutcome::Result(ToolResult::error(
                call.id.clone(),
                format!("tool `{}` denied by policy", call.name),
            ));
        }

        let Some(def) = self.deps.tools.get(&call.name).await else {
            return ToolCallOutcome::Result(ToolResult::error(
                call.id.clone(),
                format!("tool `{}` is not registered", call.name),
            ));
        };

        loop_detector.record(&call.name, &call.input);
        if let Some(message) = loop_detector.check(&call.name, &call.input) {
            return ToolCallOutcome::LoopDetected(message);
        }

        if task.permission_mode == crate::domain::PermissionMode::Plan {
            return ToolCallOutcome::Result(ToolResult::ok(
                call.id.clone(),
                format!("OBSERVE MODE: would have called `{}` with {}", call.name, call.input),
            ));
        }

        if let Some(synthetic) = self.deps.policy.filter_tool_call(policy, call) {
            return ToolCallOutcome::Result(ToolResult::ok(call.id.clone(), synthetic));
        }

        if self.requires_approval(&call.name) && task.permission_mode != crate::domain::PermissionMode::AcceptEdits {
            if let Some(gate) = &self.deps.approval {
                let outcome = gate.request(&call.name, &call.input, task.role.as_deref()).await;
                let approved = matches!(outcome, Ok(true));
                debug!(tool = %call.name, outcome = %gate_reason(&outcome), "approval gate decision");
                if !approved {
                    return ToolCallOutcome::Result(ToolResult::error(call.id.clone(), gate_reason(&outcome)));
                }
            }
        }

        match def.handler.call(ctx, call.input.clone()).await {
            Ok(output) => {
                let truncated = truncate_output(&output, TOOL_OUTPUT_TRUNCATE_BYTES);
                ToolCallOutcome::Result(ToolResult::ok(call.id.clone(), truncated))
            }
            Err(e) => ToolCallOutcome::Result(ToolResult::error(call.id.clone(), e.to_string())),
        }
    }

    fn requires_approval(&self, tool_name: &str) -> bool {
        self.deps.config.approval_gates.enabled && self.deps.config.approval_gates.tools.contains(tool_name)
    }
}

enum ToolCallOutcome {
    Result(ToolResult),
    LoopDetected(String),
}

fn role_policy(role: Option<&crate::config::RoleEntry>) -> RolePolicy {
    match role {
        Some(role) => RolePolicy {
            profile: role.tool_policy.profile.clone(),
            allow: role.tool_policy.allow.clone(),
            deny: role.tool_policy.deny.clone(),
            trust_level: role.trust_level,
        },
        None => RolePolicy {
            trust_level: TrustLevel::Auto,
            ..Default::default()
        },
    }
}

/// Soul-file prompt if the role names one and it's readable, otherwise the
/// task's own system prompt.
fn resolve_system_prompt(role: Option<&crate::config::RoleEntry>, task: &Task) -> Option<String> {
    if let Some(path) = role.and_then(|r| r.soul_prompt_path.as_deref()) {
        if let Ok(contents) = std::fs::read_to_string(path) {
            return Some(contents);
        }
    }
    task.system_prompt.clone()
}

fn is_transient(err: &ProviderError) -> bool {
    err.is_transient()
}

fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated {} bytes]", &text[..end], text.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalRequest;
    use crate::circuit::CircuitConfig;
    use crate::config::{
        ApprovalGatesConfig, CircuitBreakerEnvConfig, NotifyConfig, OfflineQueueConfig,
        ProvidersConfig, ReflectionConfig, RolesConfig, ToolsConfig,
    };
    use crate::context::JobContext;
    use crate::domain::{ProviderResult, StopReason};
    use crate::error::{ApprovalError, ToolError};
    use crate::tools::{Handler, ToolDef};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Role id dispatched by tests that need `"echo"` reachable past the
    /// policy gate (`STANDARD` doesn't include it, so a role-less dispatch
    /// would deny it before loop detection/approval/Plan ever run).
    const TESTER_ROLE: &str = "tester";

    fn tester_role() -> crate::config::RoleEntry {
        crate::config::RoleEntry {
            provider: None,
            fallback_providers: vec![],
            model: None,
            permission_mode: None,
            tool_policy: crate::config::roles::ToolPolicyEntry {
                profile: None,
                allow: ["echo".to_string()].into_iter().collect(),
                deny: Default::default(),
            },
            trust_level: TrustLevel::Auto,
            soul_prompt_path: None,
        }
    }

    fn test_config(default_provider: &str, fallback: &[&str]) -> Config {
        let mut roles = std::collections::HashMap::new();
        roles.insert(TESTER_ROLE.to_string(), tester_role());
        Config {
            providers: ProvidersConfig {
                default_provider: Some(default_provider.to_string()),
                fallback_providers: fallback.iter().map(|s| s.to_string()).collect(),
                retry_attempts: 0,
            },
            roles: RolesConfig::resolve(roles).expect("static role table resolves"),
            tools: ToolsConfig::default(),
            circuit_breaker: CircuitBreakerEnvConfig {
                fail_threshold: 5,
                success_threshold: 2,
                open_timeout_secs: 30,
            },
            offline_queue: OfflineQueueConfig { ttl_secs: 86_400, max_items: 10 },
            reflection: ReflectionConfig {
                enabled: false,
                trigger_on_fail: false,
                min_cost: dec!(0.03),
                budget_usd: dec!(0.05),
                cheap_model: None,
            },
            approval_gates: ApprovalGatesConfig {
                enabled: false,
                tools: Default::default(),
                auto_approve_tools: Default::default(),
            },
            notify: NotifyConfig { batch_interval_secs: 300 },
            dispatch: crate::config::DispatchConfig { global_concurrency: 16, child_concurrency: 4, default_timeout_secs: 600, default_budget_usd: rust_decimal::Decimal::ZERO },
            http_provider: None,
        }
    }

    struct ScriptedProvider {
        name: &'static str,
        calls: AtomicU32,
        script: Vec<Result<ProviderResult, ProviderError>>,
    }

    fn end_turn(output: &str) -> ProviderResult {
        ProviderResult {
            output: output.to_string(),
            stop_reason: StopReason::EndTurn,
            tool_calls: vec![],
            tokens_in: 10,
            tokens_out: 5,
            cost_usd: dec!(0.01),
        }
    }

    fn tool_use(name: &str, input: serde_json::Value) -> ProviderResult {
        ProviderResult {
            output: "thinking".to_string(),
            stop_reason: StopReason::ToolUse,
            tool_calls: vec![ToolCall { id: "1".into(), name: name.to_string(), input }],
            tokens_in: 10,
            tokens_out: 5,
            cost_usd: dec!(0.01),
        }
    }

    #[async_trait]
    impl crate::provider::Provider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, request: ProviderRequest) -> Result<ProviderResult, ProviderError> {
            self.execute_with_tools(request).await
        }

        async fn execute_with_tools(&self, _request: ProviderRequest) -> Result<ProviderResult, ProviderError> {
            let idx = self.calls.fetch_add(1, Ordering::Relaxed) as usize;
            self.script
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Ok(end_turn("exhausted script")))
        }
    }

    struct Echo;
    #[async_trait]
    impl Handler for Echo {
        async fn call(&self, _ctx: &JobContext, input: serde_json::Value) -> Result<String, ToolError> {
            Ok(format!("echoed {input}"))
        }
    }

    struct AlwaysApprove;
    #[async_trait]
    impl ApprovalBackend for AlwaysApprove {
        async fn request_approval(&self, _request: ApprovalRequest) -> Result<bool, ApprovalError> {
            Ok(true)
        }
    }

    async fn base_deps(config: Config) -> (ExecutorDeps, Arc<ToolRegistry>, Arc<ProviderRegistry>) {
        let providers = Arc::new(ProviderRegistry::new());
        let tools = Arc::new(ToolRegistry::new());
        tools
            .register(ToolDef::new("echo", "echoes", json!({}), Arc::new(Echo)))
            .await;

        let policy = Arc::new(PolicyResolver::new(
            config.tools.profiles.clone(),
            config.tools.trust_override.clone(),
        ));
        let circuits = Arc::new(CircuitRegistry::new(CircuitConfig::default()));
        let deps = ExecutorDeps {
            config: Arc::new(config),
            providers: providers.clone(),
            tools: tools.clone(),
            circuits,
            cooldown: Arc::new(CooldownTracker::new(Default::default())),
            queue: None,
            policy,
            approval: None,
            notify: None,
        };
        (deps, tools, providers)
    }

    #[tokio::test]
    async fn approval_gate_runs_for_configured_tools_and_allows_on_approve() {
        let mut config = test_config("A", &[]);
        config.approval_gates.enabled = true;
        config.approval_gates.tools.insert("echo".to_string());
        let (mut deps, _tools, providers) = base_deps(config).await;
        deps.approval = Some(Arc::new(ApprovalGate::new(
            Arc::new(AlwaysApprove) as Arc<dyn ApprovalBackend>,
            Default::default(),
        )));

        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![
                    Ok(tool_use("echo", json!({"msg": "hi"}))),
                    Ok(end_turn("done")),
                ],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let task = Task::new("hi", "test");
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, Some(TESTER_ROLE), &ctx).await;

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.output.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn fallback_to_second_provider_on_transient_error() {
        let config = test_config("A", &["B"]);
        let (deps, _tools, providers) = base_deps(config).await;

        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![Err(ProviderError::RequestFailed {
                    provider: "A".into(),
                    reason: "connection refused".into(),
                })],
            }))
            .await;
        providers
            .register(Arc::new(ScriptedProvider {
                name: "B",
                calls: AtomicU32::new(0),
                script: vec![Ok(end_turn("ok"))],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let task = Task::new("hi", "test");
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, None, &ctx).await;

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.output.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn non_transient_error_aborts_without_trying_fallback() {
        let config = test_config("A", &["B"]);
        let (deps, _tools, providers) = base_deps(config).await;

        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![Err(ProviderError::AuthFailed {
                    provider: "A".into(),
                    reason: "bad key".into(),
                })],
            }))
            .await;
        providers
            .register(Arc::new(ScriptedProvider {
                name: "B",
                calls: AtomicU32::new(0),
                script: vec![Ok(end_turn("should not reach here"))],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let task = Task::new("hi", "test");
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, None, &ctx).await;

        assert_eq!(result.status, TaskStatus::Error);
        assert!(result.error.unwrap().contains("authentication failed"));
    }

    #[tokio::test]
    async fn all_providers_down_without_queue_is_a_terminal_error() {
        let config = test_config("A", &[]);
        let (deps, _tools, providers) = base_deps(config).await;

        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![Err(ProviderError::RequestFailed {
                    provider: "A".into(),
                    reason: "timed out".into(),
                })],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let task = Task::new("hi", "test");
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, None, &ctx).await;

        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.error.as_deref(), Some("all providers unavailable"));
    }

    #[tokio::test]
    async fn loop_detector_aborts_on_third_identical_tool_call() {
        let config = test_config("A", &[]);
        let (deps, _tools, providers) = base_deps(config).await;

        let call = tool_use("echo", json!({"msg": "hi"}));
        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![Ok(call.clone()), Ok(call.clone()), Ok(call.clone()), Ok(call)],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let task = Task::new("hi", "test");
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, Some(TESTER_ROLE), &ctx).await;

        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.error.as_deref(), Some("loop detected"));
    }

    struct CountingEcho {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Handler for CountingEcho {
        async fn call(&self, _ctx: &JobContext, input: serde_json::Value) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(format!("echoed {input}"))
        }
    }

    #[tokio::test]
    async fn plan_permission_mode_observes_instead_of_executing() {
        let config = test_config("A", &[]);
        let (deps, tools, providers) = base_deps(config).await;

        let counting = Arc::new(CountingEcho { calls: AtomicU32::new(0) });
        tools
            .register(ToolDef::new("echo", "echoes", json!({}), counting.clone()))
            .await;

        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![
                    Ok(tool_use("echo", json!({"msg": "hi"}))),
                    Ok(end_turn("done")),
                ],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let mut task = Task::new("hi", "test");
        task.permission_mode = crate::domain::PermissionMode::Plan;
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, Some(TESTER_ROLE), &ctx).await;

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(
            counting.calls.load(Ordering::Relaxed),
            0,
            "Plan mode must observe the tool call, never actually invoke its handler"
        );
    }

    #[tokio::test]
    async fn unknown_tool_call_does_not_abort_the_task() {
        let config = test_config("A", &[]);
        let (deps, _tools, providers) = base_deps(config).await;

        providers
            .register(Arc::new(ScriptedProvider {
                name: "A",
                calls: AtomicU32::new(0),
                script: vec![
                    Ok(tool_use("nonexistent", json!({}))),
                    Ok(end_turn("recovered")),
                ],
            }))
            .await;

        let executor = AgenticLoopExecutor::new(deps);
        let task = Task::new("hi", "test");
        let ctx = JobContext::for_task(&task);
        let result = executor.run(task, None, &ctx).await;

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.output.as_deref(), Some("recovered"));
    }

    #[test]
    fn truncate_output_respects_byte_cap_on_char_boundary() {
        let text = "a".repeat(100);
        let truncated = truncate_output(&text, 10);
        assert!(truncated.starts_with(&"a".repeat(10)));
        assert!(truncated.contains("truncated"));
    }
}
