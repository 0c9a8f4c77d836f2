use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// `NotifyIntel.{BatchInterval}` (spec §6, §4.K).
#[derive(Debug, Clone, Copy)]
pub struct NotifyConfig {
    pub batch_interval_secs: u64,
}

impl NotifyConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            batch_interval_secs: parse_optional_env("NOTIFY_BATCH_INTERVAL_SECS", 300)?,
        })
    }
}
