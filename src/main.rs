//! dispatchd - dispatch-core daemon entry point.
//!
//! Wires the live modules (config, registries, breaker, queue, policy,
//! approval, notify, executor, coordinator) into a running
//! `DispatchCoordinator` and drives one task end-to-end from the CLI.
//! Channel adapters (chat bots, webhooks, cron) are out of scope for this
//! core (spec §1) — this binary is the narrowest possible ingress: a
//! single prompt submitted on the command line.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dispatch_core::approval::{ApprovalBackend, ApprovalGate, ApprovalRequest};
use dispatch_core::circuit::CircuitRegistry;
use dispatch_core::config::Config;
use dispatch_core::context::JobContext;
use dispatch_core::coordinator::{CoordinatorDeps, DispatchCoordinator};
use dispatch_core::domain::Task;
use dispatch_core::error::{ApprovalError, NotifyError, ProviderError, ToolError};
use dispatch_core::executor::{AgenticLoopExecutor, ExecutorDeps};
use dispatch_core::notify::{NotificationEngine, NotifyMessage, Notifier, Priority};
use dispatch_core::provider::cooldown::{CooldownConfig, CooldownTracker};
use dispatch_core::provider::openai_compatible::OpenAiCompatibleProvider;
use dispatch_core::provider::{Provider, ProviderRegistry};
use dispatch_core::queue::libsql_store::LibSqlQueueStore;
use dispatch_core::queue::OfflineQueueStore;
use dispatch_core::tools::policy::PolicyResolver;
use dispatch_core::tools::{Handler, ToolDef, ToolRegistry};

#[derive(Debug, Parser)]
#[command(name = "dispatchd", about = "Multi-agent, multi-provider task dispatcher")]
struct Cli {
    /// Prompt text for the task to run. Reads stdin if omitted.
    #[arg(long)]
    prompt: Option<String>,

    /// Role id to dispatch under (must be present in the structured config
    /// file's `[roles.<id>]` table).
    #[arg(long)]
    role: Option<String>,

    /// Path to the libSQL offline-queue database file.
    #[arg(long, default_value = "dispatch-queue.db")]
    queue_path: PathBuf,

    /// Use an in-memory queue instead of `--queue-path` (handy for a
    /// quick local smoke test; nothing survives the process).
    #[arg(long)]
    queue_in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);

    let providers = Arc::new(ProviderRegistry::new());
    if let Some(http_config) = config.http_provider.clone() {
        let name = http_config.name.clone();
        let provider = OpenAiCompatibleProvider::new(http_config)?;
        providers.register(Arc::new(provider)).await;
        info!(provider = %name, "registered HTTP provider");
    } else {
        info!("no HTTP_PROVIDER_BASE_URL configured; registering a local echo provider");
        providers.register(Arc::new(EchoProvider)).await;
    }

    let tools = Arc::new(ToolRegistry::new());
    register_demo_tools(&tools).await;

    let circuits = Arc::new(CircuitRegistry::new(config.circuit_breaker.as_circuit_config()));
    let cooldown = Arc::new(CooldownTracker::new(CooldownConfig::default()));
    let policy = Arc::new(PolicyResolver::new(
        config.tools.profiles.clone(),
        config.tools.trust_override.clone(),
    ));

    let queue: Arc<dyn OfflineQueueStore> = if cli.queue_in_memory {
        Arc::new(LibSqlQueueStore::open_memory().await?)
    } else {
        Arc::new(LibSqlQueueStore::open_local(&cli.queue_path).await?)
    };

    let approval = Arc::new(ApprovalGate::new(
        Arc::new(ConsoleApprovalBackend) as Arc<dyn ApprovalBackend>,
        config.approval_gates.auto_approve_tools.clone(),
    ));

    let notify = Arc::new(NotificationEngine::new(
        vec![Box::new(ConsoleNotifier) as Box<dyn Notifier>],
        std::time::Duration::from_secs(config.notify.batch_interval_secs),
    ));

    let executor = Arc::new(AgenticLoopExecutor::new(ExecutorDeps {
        config: config.clone(),
        providers,
        tools,
        circuits,
        cooldown,
        queue: Some(queue.clone()),
        policy,
        approval: Some(approval),
        notify: Some(notify.clone()),
    }));

    let coordinator = DispatchCoordinator::new(CoordinatorDeps {
        config: config.clone(),
        executor,
        reflection_store: None,
        notify: Some(notify.clone()),
    });

    coordinator.recover_queue(queue.as_ref()).await;

    let prompt = match cli.prompt {
        Some(p) => p,
        None => read_stdin_prompt()?,
    };

    let mut task = Task::new(prompt, "cli");
    task.role = cli.role.clone();

    let result = coordinator.dispatch(task, cli.role).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    notify.stop().await?;
    Ok(())
}

fn read_stdin_prompt() -> anyhow::Result<String> {
    use std::io::Read;
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        anyhow::bail!("no prompt given: pass --prompt or pipe one on stdin");
    }
    Ok(buf)
}

/// Registers a couple of toy builtin tools so `dispatchd` is runnable
/// standalone without a caller supplying domain tool bodies (spec §1: tool
/// bodies are an external collaborator; these exist only to exercise the
/// pipeline end-to-end).
async fn register_demo_tools(tools: &ToolRegistry) {
    tools
        .register(
            ToolDef::new(
                "echo",
                "Echoes its input back as the tool result",
                serde_json::json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"],
                }),
                Arc::new(EchoHandler),
            )
            .builtin(),
        )
        .await;
}

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn call(&self, _ctx: &JobContext, input: Value) -> Result<String, ToolError> {
        Ok(input
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Zero-configuration fallback `Provider` for local smoke-testing: ends
/// the turn immediately with a fixed message. Registered only when no
/// `HTTP_PROVIDER_BASE_URL` is configured.
struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(
        &self,
        request: dispatch_core::domain::ProviderRequest,
    ) -> Result<dispatch_core::domain::ProviderResult, ProviderError> {
        Ok(dispatch_core::domain::ProviderResult {
            output: format!("echo: {}", request.prompt),
            stop_reason: dispatch_core::domain::StopReason::EndTurn,
            tool_calls: vec![],
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: Decimal::ZERO,
        })
    }

    async fn execute_with_tools(
        &self,
        request: dispatch_core::domain::ProviderRequest,
    ) -> Result<dispatch_core::domain::ProviderResult, ProviderError> {
        self.execute(request).await
    }
}

/// Approval backend that prompts on stdout/stdin. Suitable for a local
/// operator running `dispatchd` interactively; a real deployment supplies
/// its own backend over whatever channel surfaces the approval UI.
struct ConsoleApprovalBackend;

#[async_trait]
impl ApprovalBackend for ConsoleApprovalBackend {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<bool, ApprovalError> {
        println!("approval requested for `{}`: {}", request.tool_name, request.summary);
        println!("approve? [y/N]");
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| ApprovalError::Backend(e.to_string()))?;
        Ok(line.trim().eq_ignore_ascii_case("y"))
    }
}

/// Notifier that writes to stdout, always eligible (min priority Low).
struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn min_priority(&self) -> Priority {
        Priority::Low
    }

    async fn deliver(&self, message: &NotifyMessage) -> Result<(), NotifyError> {
        println!("[{:?}] {}", message.priority, message.text);
        Ok(())
    }
}
