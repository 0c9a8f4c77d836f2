use std::time::Duration;

use crate::circuit::CircuitConfig;
use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// `CircuitBreaker.{FailThreshold, SuccessThreshold, OpenTimeout}` (spec
/// §6), resolved from the environment the way `RoutineConfig` resolves its
/// numeric knobs in the teacher.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerEnvConfig {
    pub fail_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_secs: u64,
}

impl CircuitBreakerEnvConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            fail_threshold: parse_optional_env("CIRCUIT_BREAKER_FAIL_THRESHOLD", 5)?,
            success_threshold: parse_optional_env("CIRCUIT_BREAKER_SUCCESS_THRESHOLD", 2)?,
            open_timeout_secs: parse_optional_env("CIRCUIT_BREAKER_OPEN_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn as_circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            fail_threshold: self.fail_threshold,
            success_threshold: self.success_threshold,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
        }
    }
}
