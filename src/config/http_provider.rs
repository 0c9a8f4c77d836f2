use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Connection details for a single OpenAI-compatible HTTP endpoint (spec
/// module 4.B is silent on what a concrete provider needs; this is the
/// supplemented ambient config a real `Provider` impl requires).
///
/// Registered under one name (`HTTP_PROVIDER_NAME`, default `"openai"`)
/// at startup; additional endpoints can be wired the same way under a
/// different env prefix and registered name.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl HttpProviderConfig {
    /// `None` when no base URL is configured — the caller treats this as
    /// "no HTTP provider to register" rather than an error, since a
    /// deployment may run entirely against in-process/test providers.
    pub(crate) fn resolve() -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = optional_env("HTTP_PROVIDER_BASE_URL")? else {
            return Ok(None);
        };
        Ok(Some(Self {
            name: optional_env("HTTP_PROVIDER_NAME")?.unwrap_or_else(|| "openai".to_string()),
            base_url,
            api_key: optional_env("HTTP_PROVIDER_API_KEY")?,
            model: optional_env("HTTP_PROVIDER_MODEL")?.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            timeout_secs: parse_optional_env("HTTP_PROVIDER_TIMEOUT_SECS", 120)?,
        }))
    }
}
