use rust_decimal::Decimal;

use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// Dispatch concurrency and task-default knobs (SPEC_FULL §5 & §7:
/// coordinator concurrency invariants plus the ingress default-fill the
/// Coordinator applies to an under-specified task). Supplemented — spec.md
/// names the invariants but not the config surface that sizes them.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Global in-flight task cap (concurrency invariant 1).
    pub global_concurrency: usize,
    /// Separate cap for child tasks (reflection follow-ups, sub-agent
    /// calls) so they never contend with their own parent's permit
    /// (concurrency invariant 2).
    pub child_concurrency: usize,
    /// Filled onto a task whose `timeout` is zero.
    pub default_timeout_secs: u64,
    /// Filled onto a task whose `budget_usd` is zero.
    pub default_budget_usd: Decimal,
}

impl DispatchConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            global_concurrency: parse_optional_env("DISPATCH_GLOBAL_CONCURRENCY", 16)?,
            child_concurrency: parse_optional_env("DISPATCH_CHILD_CONCURRENCY", 4)?,
            default_timeout_secs: parse_optional_env("DISPATCH_DEFAULT_TIMEOUT_SECS", 600)?,
            default_budget_usd: parse_optional_env("DISPATCH_DEFAULT_BUDGET_USD", Decimal::ZERO)?,
        })
    }
}
