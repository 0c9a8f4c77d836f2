use std::collections::HashSet;

use crate::config::helpers::{optional_env, parse_bool_env};
use crate::error::ConfigError;

/// `ApprovalGates.{Enabled, Tools, AutoApproveTools}` (spec §6, §4.G).
#[derive(Debug, Clone)]
pub struct ApprovalGatesConfig {
    pub enabled: bool,
    pub tools: HashSet<String>,
    pub auto_approve_tools: HashSet<String>,
}

impl ApprovalGatesConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool_env("APPROVAL_GATES_ENABLED", false)?,
            tools: optional_env("APPROVAL_GATES_TOOLS")?
                .map(|raw| split_csv(&raw))
                .unwrap_or_default(),
            auto_approve_tools: optional_env("APPROVAL_GATES_AUTO_APPROVE_TOOLS")?
                .map(|raw| split_csv(&raw))
                .unwrap_or_default(),
        })
    }
}

fn split_csv(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
