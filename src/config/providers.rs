use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Global provider knobs (spec §6: `DefaultProvider`, `FallbackProviders`).
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub default_provider: Option<String>,
    pub fallback_providers: Vec<String>,
    /// Supplemented (SPEC_FULL §11): attempts a `RetryProvider` wraps each
    /// candidate with, 0 = disabled (retry decorator not applied).
    pub retry_attempts: u32,
}

impl ProvidersConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let fallback_providers = optional_env("FALLBACK_PROVIDERS")?
            .map(|raw| split_csv(&raw))
            .unwrap_or_default();

        Ok(Self {
            default_provider: optional_env("DEFAULT_PROVIDER")?,
            fallback_providers,
            retry_attempts: parse_optional_env("PROVIDERS_RETRY_ATTEMPTS", 0)?,
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
