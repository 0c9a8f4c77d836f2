//! Configuration assembly: environment variables via `dotenvy` plus a
//! structured `toml` file for role/tool tables, following the shape of the
//! teacher's `src/config/*.rs` (`DatabaseConfig::resolve`,
//! `RoutineConfig::resolve`, …) — one typed sub-config per concern, each
//! with its own `resolve()`.

pub mod approval;
pub mod circuit;
pub mod dispatch;
pub mod helpers;
pub mod http_provider;
pub mod notify;
pub mod providers;
pub mod queue;
pub mod reflection;
pub mod roles;
pub mod tools;

use std::path::{Path, PathBuf};

pub use approval::ApprovalGatesConfig;
pub use circuit::CircuitBreakerEnvConfig;
pub use dispatch::DispatchConfig;
pub use http_provider::HttpProviderConfig;
pub use notify::NotifyConfig;
pub use providers::ProvidersConfig;
pub use queue::OfflineQueueConfig;
pub use reflection::ReflectionConfig;
pub use roles::{RoleEntry, RolesConfig};
pub use tools::ToolsConfig;

use crate::error::ConfigError;
use helpers::optional_env;

/// Top-level config assembled from the environment plus an optional
/// structured toml file (`DISPATCH_CONFIG_PATH`, default
/// `dispatch.toml`) for the naturally-tabular role/tool-profile data.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub roles: RolesConfig,
    pub tools: ToolsConfig,
    pub circuit_breaker: CircuitBreakerEnvConfig,
    pub offline_queue: OfflineQueueConfig,
    pub reflection: ReflectionConfig,
    pub approval_gates: ApprovalGatesConfig,
    pub notify: NotifyConfig,
    pub dispatch: DispatchConfig,
    pub http_provider: Option<HttpProviderConfig>,
}

/// The subset of config that comes from the structured toml file rather
/// than flat env vars.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StructuredConfig {
    #[serde(default)]
    pub roles: std::collections::HashMap<String, RoleEntry>,
    #[serde(default)]
    pub tool_profiles: std::collections::HashMap<String, std::collections::HashSet<String>>,
    #[serde(default)]
    pub trust_override: std::collections::HashMap<String, crate::tools::policy::TrustLevel>,
}

impl StructuredConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }
}

impl Config {
    /// Load `.env` (if present), then resolve every sub-config from the
    /// environment and, when present, the structured toml file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let structured_path = optional_env("DISPATCH_CONFIG_PATH")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dispatch.toml"));
        let structured = if structured_path.exists() {
            StructuredConfig::load(&structured_path)?
        } else {
            StructuredConfig::default()
        };

        Ok(Self {
            providers: ProvidersConfig::resolve()?,
            roles: RolesConfig::resolve(structured.roles)?,
            tools: ToolsConfig::resolve(structured.tool_profiles, structured.trust_override)?,
            circuit_breaker: CircuitBreakerEnvConfig::resolve()?,
            offline_queue: OfflineQueueConfig::resolve()?,
            reflection: ReflectionConfig::resolve()?,
            approval_gates: ApprovalGatesConfig::resolve()?,
            notify: NotifyConfig::resolve()?,
            dispatch: DispatchConfig::resolve()?,
            http_provider: HttpProviderConfig::resolve()?,
        })
    }
}
