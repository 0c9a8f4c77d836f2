use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// `OfflineQueue.{TTL, MaxItems}` (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct OfflineQueueConfig {
    pub ttl_secs: u64,
    pub max_items: usize,
}

impl OfflineQueueConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            ttl_secs: parse_optional_env("OFFLINE_QUEUE_TTL_SECS", 86_400)?,
            max_items: parse_optional_env("OFFLINE_QUEUE_MAX_ITEMS", 1000)?,
        })
    }
}
