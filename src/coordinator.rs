//! Dispatch Coordinator (spec module 4.I): bounds global concurrency,
//! owns the trace id, drives a task through the executor, and hands off
//! to the Reflection/Notification engines on a non-queued termination.

use std::sync::Arc;

use futures::FutureExt;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::context::JobContext;
use crate::domain::{Task, TaskResult, TaskStatus};
use crate::executor::AgenticLoopExecutor;
use crate::notify::{NotificationEngine, NotifyMessage, Priority};
use crate::reflection::{build_reflection_task, record_reflection, should_reflect, ReflectionStore};

pub struct CoordinatorDeps {
    pub config: Arc<Config>,
    pub executor: Arc<AgenticLoopExecutor>,
    pub reflection_store: Option<Arc<dyn ReflectionStore>>,
    pub notify: Option<Arc<NotificationEngine>>,
}

pub struct DispatchCoordinator {
    config: Arc<Config>,
    executor: Arc<AgenticLoopExecutor>,
    reflection_store: Option<Arc<dyn ReflectionStore>>,
    notify: Option<Arc<NotificationEngine>>,
    global_semaphore: Arc<Semaphore>,
    child_semaphore: Arc<Semaphore>,
}

impl DispatchCoordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        let global_capacity = deps.config.dispatch.global_concurrency.max(1);
        let child_capacity = deps.config.dispatch.child_concurrency.max(1);
        Self {
            config: deps.config,
            executor: deps.executor,
            reflection_store: deps.reflection_store,
            notify: deps.notify,
            global_semaphore: Arc::new(Semaphore::new(global_capacity)),
            child_semaphore: Arc::new(Semaphore::new(child_capacity)),
        }
    }

    /// Top-level entry point for a freshly-ingressed task.
    pub async fn dispatch(&self, task: Task, role_id: Option<String>) -> TaskResult {
        let permit = self
            .global_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("global dispatch semaphore is never closed");
        let result = self.run_guarded(task, role_id, permit).await;
        result
    }

    /// Dispatches a task using the child semaphore instead of the parent's,
    /// so reflection follow-ups never contend with the capacity their own
    /// parent task holds.
    async fn dispatch_child(&self, task: Task, role_id: Option<String>) -> TaskResult {
        let permit = self
            .child_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("child dispatch semaphore is never closed");
        self.run_guarded(task, role_id, permit).await
    }

    /// Fills a task's unset fields from config and, when present, the
    /// dispatching role (spec §7 ingress default-fill).
    fn apply_defaults(&self, mut task: Task, role_id: Option<&str>) -> Task {
        task = task.with_defaults(
            std::time::Duration::from_secs(self.config.dispatch.default_timeout_secs),
            self.config.dispatch.default_budget_usd,
        );

        let Some(role) = role_id.and_then(|id| self.config.roles.get(id)) else {
            return task;
        };
        if task.model_hint.is_none() {
            task.model_hint = role.model.clone();
        }
        if let Some(mode) = role.permission_mode {
            task.permission_mode = mode;
        }
        task
    }

    async fn run_guarded(
        &self,
        task: Task,
        role_id: Option<String>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> TaskResult {
        let task = self.apply_defaults(task, role_id.as_deref());
        let trace_id = Uuid::new_v4();
        let ctx = JobContext::for_task(&task).with_trace_id(trace_id);
        let span = info_span!("dispatch", task_id = %task.id, trace_id = %trace_id, role = ?role_id);

        let outcome = {
            let executor = self.executor.clone();
            let task_for_run = task.clone();
            let role_for_run = role_id.clone();
            std::panic::AssertUnwindSafe(
                async move { executor.run(task_for_run, role_for_run.as_deref(), &ctx).await }
                    .instrument(span),
            )
            .catch_unwind()
            .await
        };
        drop(permit);

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(task_id = %task.id, "panic recovered during task execution");
                TaskResult::error(&task, TaskStatus::Error, "internal error: task execution panicked")
            }
        };

        if result.status == TaskStatus::Queued {
            info!(task_id = %task.id, "task deferred to offline queue, skipping reflection/notification");
            return result;
        }

        self.maybe_reflect(&task, &result).await;
        self.maybe_notify(&task, &result).await;

        result
    }

    async fn maybe_reflect(&self, task: &Task, result: &TaskResult) {
        let Some(store) = &self.reflection_store else { return };
        if !should_reflect(&self.config.reflection, task, result) {
            return;
        }

        let reflection_task = build_reflection_task(
            self.config.reflection.cheap_model.as_deref(),
            &self.config.reflection,
            task,
            result,
        );
        let reflection_result = self.dispatch_child(reflection_task, task.role.clone()).await;

        let Some(role) = &task.role else { return };
        if reflection_result.status != TaskStatus::Success {
            return;
        }
        let Some(output) = &reflection_result.output else { return };

        match record_reflection(store.as_ref(), task.id, role, output, reflection_result.cost_usd).await {
            Ok(record) => info!(task_id = %task.id, score = record.score, "reflection recorded"),
            Err(e) => error!(task_id = %task.id, error = %e, "failed to record reflection"),
        }
    }

    async fn maybe_notify(&self, task: &Task, result: &TaskResult) {
        let Some(notify) = &self.notify else { return };

        let (priority, text) = match result.status {
            TaskStatus::Success => (Priority::Low, format!("task {} completed", task.id)),
            TaskStatus::Error => (
                Priority::High,
                format!("task {} failed: {}", task.id, result.error.as_deref().unwrap_or("unknown error")),
            ),
            TaskStatus::Cancelled | TaskStatus::Timeout => {
                (Priority::Normal, format!("task {} did not complete: {:?}", task.id, result.status))
            }
            TaskStatus::Queued => return,
        };

        let _ = notify
            .notify(NotifyMessage {
                text,
                priority,
                event_type: "task_complete".to_string(),
                role: task.role.clone(),
            })
            .await;
    }

    /// Startup recovery: resets any `processing` queue rows stranded by a
    /// prior process to `pending` (spec §11 queue recovery scan).
    pub async fn recover_queue(&self, queue: &dyn crate::queue::OfflineQueueStore) -> Decimal {
        match queue.recover_stale().await {
            Ok(count) => {
                info!(recovered = count, "offline queue recovery scan complete");
                Decimal::from(count)
            }
            Err(e) => {
                error!(error = %e, "offline queue recovery scan failed");
                Decimal::ZERO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalBackend;
    use crate::circuit::{CircuitConfig, CircuitRegistry};
    use crate::config::{
        ApprovalGatesConfig, CircuitBreakerEnvConfig, NotifyConfig, OfflineQueueConfig,
        ProvidersConfig, ReflectionConfig, RolesConfig, ToolsConfig,
    };
    use crate::domain::{ProviderResult, StopReason};
    use crate::error::ProviderError;
    use crate::executor::ExecutorDeps;
    use crate::provider::cooldown::CooldownTracker;
    use crate::provider::ProviderRegistry;
    use crate::tools::policy::PolicyResolver;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct AlwaysOk;
    #[async_trait]
    impl crate::provider::Provider for AlwaysOk {
        fn name(&self) -> &str {
            "A"
        }
        async fn execute(
            &self,
            _request: crate::domain::ProviderRequest,
        ) -> Result<ProviderResult, ProviderError> {
            Ok(ProviderResult {
                output: "done".into(),
                stop_reason: StopReason::EndTurn,
                tool_calls: vec![],
                tokens_in: 1,
                tokens_out: 1,
                cost_usd: dec!(0.0),
            })
        }
        async fn execute_with_tools(
            &self,
            request: crate::domain::ProviderRequest,
        ) -> Result<ProviderResult, ProviderError> {
            self.execute(request).await
        }
    }

    async fn test_coordinator() -> DispatchCoordinator {
        let config = Arc::new(Config {
            providers: ProvidersConfig {
                default_provider: Some("A".to_string()),
                fallback_providers: vec![],
                retry_attempts: 0,
            },
            roles: RolesConfig::default(),
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
            dispatch: crate::config::DispatchConfig { global_concurrency: 4, child_concurrency: 2, default_timeout_secs: 600, default_budget_usd: rust_decimal::Decimal::ZERO },
            http_provider: None,
        });

        let providers = Arc::new(ProviderRegistry::new());
        providers.register(Arc::new(AlwaysOk)).await;
        let tools = Arc::new(ToolRegistry::new());
        let policy = Arc::new(PolicyResolver::new(Default::default(), Default::default()));

        let executor = Arc::new(AgenticLoopExecutor::new(ExecutorDeps {
            config: config.clone(),
            providers,
            tools,
            circuits: Arc::new(CircuitRegistry::new(CircuitConfig::default())),
            cooldown: Arc::new(CooldownTracker::new(Default::default())),
            queue: None,
            policy,
            approval: None::<Arc<crate::approval::ApprovalGate<Arc<dyn ApprovalBackend>>>>,
            notify: None,
        }));

        DispatchCoordinator::new(CoordinatorDeps {
            config,
            executor,
            reflection_store: None,
            notify: None,
        })
    }

    #[tokio::test]
    async fn dispatch_fills_budget_and_timeout_from_config_defaults() {
        let mut coordinator = test_coordinator().await;
        coordinator.config = Arc::new(Config {
            dispatch: crate::config::DispatchConfig {
                global_concurrency: 4,
                child_concurrency: 2,
                default_timeout_secs: 45,
                default_budget_usd: dec!(2.50),
            },
            ..(*coordinator.config).clone()
        });

        let task = Task::new("hi", "test");
        assert_eq!(task.budget_usd, Decimal::ZERO);

        let filled = coordinator.apply_defaults(task, None);
        assert_eq!(filled.budget_usd, dec!(2.50));
        assert_eq!(filled.timeout, std::time::Duration::from_secs(45));
    }

    #[tokio::test]
    async fn dispatch_applies_role_model_and_permission_mode() {
        let mut coordinator = test_coordinator().await;
        let mut roles = std::collections::HashMap::new();
        roles.insert(
            "dev".to_string(),
            crate::config::RoleEntry {
                provider: None,
                fallback_providers: vec![],
                model: Some("gpt-4o-mini".to_string()),
                permission_mode: Some(crate::domain::PermissionMode::Plan),
                tool_policy: Default::default(),
                trust_level: crate::tools::policy::TrustLevel::Auto,
                soul_prompt_path: None,
            },
        );
        coordinator.config = Arc::new(Config {
            roles: RolesConfig::resolve(roles).unwrap(),
            ..(*coordinator.config).clone()
        });

        let task = Task::new("hi", "test");
        let filled = coordinator.apply_defaults(task, Some("dev"));

        assert_eq!(filled.model_hint.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(filled.permission_mode, crate::domain::PermissionMode::Plan);
    }

    #[tokio::test]
    async fn dispatch_releases_permit_and_returns_success() {
        let coordinator = test_coordinator().await;
        let task = Task::new("hi", "test");
        let result = coordinator.dispatch(task, None).await;
        assert_eq!(result.status, TaskStatus::Success);

        assert_eq!(coordinator.global_semaphore.available_permits(), 4);
    }

    struct AlwaysDown;
    #[async_trait]
    impl crate::provider::Provider for AlwaysDown {
        fn name(&self) -> &str {
            "A"
        }
        async fn execute(
            &self,
            _request: crate::domain::ProviderRequest,
        ) -> Result<ProviderResult, ProviderError> {
            Err(ProviderError::RequestFailed {
                provider: "A".to_string(),
                reason: "connection refused".to_string(),
            })
        }
        async fn execute_with_tools(
            &self,
            request: crate::domain::ProviderRequest,
        ) -> Result<ProviderResult, ProviderError> {
            self.execute(request).await
        }
    }

    struct CountingNotifier {
        calls: std::sync::atomic::AtomicU32,
    }
    #[async_trait]
    impl crate::notify::Notifier for Arc<CountingNotifier> {
        fn min_priority(&self) -> Priority {
            Priority::Low
        }
        async fn deliver(&self, _message: &NotifyMessage) -> Result<(), crate::error::NotifyError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    struct InMemoryQueue {
        items: tokio::sync::Mutex<Vec<Task>>,
    }
    #[async_trait]
    impl crate::queue::OfflineQueueStore for InMemoryQueue {
        async fn enqueue(&self, task: &Task, _role: Option<&str>, _priority: i32) -> Result<i64, crate::error::QueueError> {
            let mut items = self.items.lock().await;
            items.push(task.clone());
            Ok(items.len() as i64)
        }
        async fn dequeue_next(&self) -> Result<Option<crate::queue::QueueItem>, crate::error::QueueError> {
            Ok(None)
        }
        async fn cleanup_expired(&self, _ttl: std::time::Duration) -> Result<u64, crate::error::QueueError> {
            Ok(0)
        }
        async fn is_full(&self, max: usize) -> Result<bool, crate::error::QueueError> {
            Ok(self.items.lock().await.len() >= max)
        }
        async fn count_pending(&self) -> Result<usize, crate::error::QueueError> {
            Ok(self.items.lock().await.len())
        }
        async fn update_status(
            &self,
            _id: i64,
            _status: crate::queue::QueueStatus,
            _error: Option<&str>,
        ) -> Result<(), crate::error::QueueError> {
            Ok(())
        }
        async fn increment_retry(
            &self,
            _id: i64,
            _status: crate::queue::QueueStatus,
            _error: Option<&str>,
        ) -> Result<(), crate::error::QueueError> {
            Ok(())
        }
        async fn delete(&self, _id: i64) -> Result<(), crate::error::QueueError> {
            Ok(())
        }
        async fn recover_stale(&self) -> Result<u64, crate::error::QueueError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn queued_result_skips_reflection_and_notification() {
        let mut coordinator = test_coordinator().await;

        let providers = Arc::new(ProviderRegistry::new());
        providers.register(Arc::new(AlwaysDown)).await;
        let counting = Arc::new(CountingNotifier { calls: std::sync::atomic::AtomicU32::new(0) });
        let notify_engine = Arc::new(NotificationEngine::new(
            vec![Box::new(counting.clone())],
            std::time::Duration::from_secs(300),
        ));

        let executor = Arc::new(AgenticLoopExecutor::new(ExecutorDeps {
            config: coordinator.config.clone(),
            providers,
            tools: Arc::new(ToolRegistry::new()),
            circuits: Arc::new(CircuitRegistry::new(CircuitConfig::default())),
            cooldown: Arc::new(CooldownTracker::new(Default::default())),
            queue: Some(Arc::new(InMemoryQueue { items: tokio::sync::Mutex::new(vec![]) })),
            policy: Arc::new(PolicyResolver::new(Default::default(), Default::default())),
            approval: None::<Arc<crate::approval::ApprovalGate<Arc<dyn ApprovalBackend>>>>,
            notify: None,
        }));
        coordinator.executor = executor;
        coordinator.notify = Some(notify_engine);

        let mut task = Task::new("hi", "test");
        task.role = Some("dev".to_string());
        let result = coordinator.dispatch(task, None).await;

        assert_eq!(result.status, TaskStatus::Queued);
        assert_eq!(counting.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
