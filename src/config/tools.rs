use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::tools::policy::TrustLevel;

/// `Tools.{Profiles, TrustOverride}` (spec §6): custom tool profiles and
/// per-tool trust overrides, both naturally tabular so they're sourced
/// from the structured config file rather than flat env vars.
#[derive(Debug, Clone, Default)]
pub struct ToolsConfig {
    pub profiles: HashMap<String, HashSet<String>>,
    pub trust_override: HashMap<String, TrustLevel>,
}

impl ToolsConfig {
    pub(crate) fn resolve(
        profiles: HashMap<String, HashSet<String>>,
        trust_override: HashMap<String, TrustLevel>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            profiles,
            trust_override,
        })
    }
}
