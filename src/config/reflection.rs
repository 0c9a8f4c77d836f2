use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;

/// `Reflection.{Enabled, TriggerOnFail, MinCost, Budget}` (spec §6, §4.J).
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    pub enabled: bool,
    pub trigger_on_fail: bool,
    pub min_cost: Decimal,
    pub budget_usd: Decimal,
    /// Model hint for the cheap follow-up reflection task (spec §4.J);
    /// `None` leaves the candidate builder to fall back to the ordinary
    /// default-provider resolution.
    pub cheap_model: Option<String>,
}

impl ReflectionConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool_env("REFLECTION_ENABLED", false)?,
            trigger_on_fail: parse_bool_env("REFLECTION_TRIGGER_ON_FAIL", false)?,
            min_cost: parse_optional_env("REFLECTION_MIN_COST", dec!(0.03))?,
            budget_usd: parse_optional_env("REFLECTION_BUDGET_USD", dec!(0.05))?,
            cheap_model: optional_env("REFLECTION_CHEAP_MODEL")?,
        })
    }
}
