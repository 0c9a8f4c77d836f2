use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::domain::PermissionMode;
use crate::error::ConfigError;
use crate::tools::policy::TrustLevel;

/// One role/agent's configuration bundle. The legacy label is "role";
/// newer config may say "agent" — both deserialize to this type.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleEntry {
    pub provider: Option<String>,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    #[serde(default)]
    pub tool_policy: ToolPolicyEntry,
    #[serde(default = "default_trust_level")]
    pub trust_level: TrustLevel,
    /// Path to this role's long-form system prompt ("soul" prompt), loaded
    /// from disk when present; falls back to the config default prompt.
    #[serde(default)]
    pub soul_prompt_path: Option<String>,
}

fn default_trust_level() -> TrustLevel {
    TrustLevel::Auto
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolPolicyEntry {
    pub profile: Option<String>,
    #[serde(default)]
    pub allow: HashSet<String>,
    #[serde(default)]
    pub deny: HashSet<String>,
}

/// Role table, keyed by role id, resolved from the structured config file.
#[derive(Debug, Clone, Default)]
pub struct RolesConfig {
    pub roles: HashMap<String, RoleEntry>,
}

impl RolesConfig {
    pub(crate) fn resolve(roles: HashMap<String, RoleEntry>) -> Result<Self, ConfigError> {
        Ok(Self { roles })
    }

    pub fn get(&self, role_id: &str) -> Option<&RoleEntry> {
        self.roles.get(role_id)
    }
}
