//! Tool profile resolution and trust-based call filtering (spec module
//! 4.E): built-in/custom profiles, per-role allow/deny, and the
//! Observe/Suggest/Auto trust gate that runs ahead of the approval gate.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::ToolCall;
use crate::tools::ToolRegistry;

/// Trust level attached to a role; a per-tool override in
/// `Tools.TrustOverride` replaces it for that one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Never execute; report what would have happened.
    Observe,
    /// Never execute without an explicit approval step.
    Suggest,
    /// Execute immediately, subject only to policy/approval-gate config.
    Auto,
}

/// The resolved allow-list for one role at one point in policy evaluation.
/// `Full` is a wildcard resolved against the registry's *current* contents
/// each time, not cached at registration time.
#[derive(Debug, Clone)]
pub enum ToolProfile {
    Minimal,
    Standard,
    Full,
    /// No profile applies; the caller must decide how to treat this (the
    /// spec calls this out as an explicit "unrecognized" case rather than
    /// folding it into standard).
    None,
    Custom(HashSet<String>),
}

impl ToolProfile {
    pub const MINIMAL: &'static [&'static str] =
        &["memory_search", "memory_get", "knowledge_search"];

    pub const STANDARD: &'static [&'static str] = &[
        "memory_search",
        "memory_get",
        "knowledge_search",
        "file_read",
        "file_write",
        "exec",
        "http",
        "web_search",
        "create_job",
    ];

    pub fn from_name(name: &str, profiles: &HashMap<String, HashSet<String>>) -> Self {
        match name {
            "minimal" => ToolProfile::Minimal,
            "standard" => ToolProfile::Standard,
            "full" => ToolProfile::Full,
            "none" => ToolProfile::None,
            other => profiles
                .get(other)
                .cloned()
                .map(ToolProfile::Custom)
                .unwrap_or(ToolProfile::None),
        }
    }

    /// Resolve to a concrete set of tool names. `Full` queries the
    /// registry for everything currently registered.
    pub async fn resolve(&self, registry: &ToolRegistry) -> HashSet<String> {
        match self {
            ToolProfile::Minimal => Self::MINIMAL.iter().map(|s| s.to_string()).collect(),
            ToolProfile::Standard => Self::STANDARD.iter().map(|s| s.to_string()).collect(),
            ToolProfile::Full => registry.names().await.into_iter().collect(),
            ToolProfile::None => HashSet::new(),
            ToolProfile::Custom(set) => set.clone(),
        }
    }
}

/// Per-role tool policy: named profile plus explicit allow/deny overlays.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    pub profile: Option<String>,
    pub allow: HashSet<String>,
    pub deny: HashSet<String>,
    pub trust_level: TrustLevel,
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Auto
    }
}

/// Resolves the effective allowed tool set and the trust filter for a role,
/// given the registered custom profiles and any per-tool trust override.
pub struct PolicyResolver {
    pub custom_profiles: HashMap<String, HashSet<String>>,
    pub trust_override: HashMap<String, TrustLevel>,
}

impl PolicyResolver {
    pub fn new(
        custom_profiles: HashMap<String, HashSet<String>>,
        trust_override: HashMap<String, TrustLevel>,
    ) -> Self {
        Self {
            custom_profiles,
            trust_override,
        }
    }

    /// Default profile name used when a role doesn't name one.
    pub const DEFAULT_PROFILE: &'static str = "standard";

    /// Effective allowed set = profile's allow ∪ role.allow, minus role.deny.
    pub async fn effective_allowed(
        &self,
        registry: &ToolRegistry,
        policy: &RolePolicy,
    ) -> HashSet<String> {
        let profile_name = policy
            .profile
            .as_deref()
            .unwrap_or(Self::DEFAULT_PROFILE);
        let profile = ToolProfile::from_name(profile_name, &self.custom_profiles);
        let mut allowed = profile.resolve(registry).await;
        allowed.extend(policy.allow.iter().cloned());
        for denied in &policy.deny {
            allowed.remove(denied);
        }
        allowed
    }

    /// Trust level in effect for `tool_name` under `policy`: the per-tool
    /// override wins over the role's own level.
    pub fn trust_for(&self, policy: &RolePolicy, tool_name: &str) -> TrustLevel {
        self.trust_override
            .get(tool_name)
            .copied()
            .unwrap_or(policy.trust_level)
    }

    /// Apply the trust filter ahead of policy/approval gates. Returns
    /// `Some(synthetic content)` when the caller must not execute the tool;
    /// `None` when execution should proceed (trust level `Auto`).
    pub fn filter_tool_call(&self, policy: &RolePolicy, call: &ToolCall) -> Option<String> {
        match self.trust_for(policy, &call.name) {
            TrustLevel::Observe => Some(format!(
                "OBSERVE MODE: would have called `{}` with {}",
                call.name, call.input
            )),
            TrustLevel::Suggest => Some(format!(
                "APPROVAL REQUIRED: `{}` with {} is awaiting approval",
                call.name, call.input
            )),
            TrustLevel::Auto => None,
        }
    }
}
