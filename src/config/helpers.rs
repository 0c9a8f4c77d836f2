//! Small env-var resolution helpers shared by every sub-config's
//! `resolve()`. Centralized so every knob reports a missing/invalid value
//! the same way, rather than each sub-config hand-rolling `std::env::var`.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an optional env var. `None` when unset; an error only if the
/// underlying OS string isn't valid UTF-8.
pub fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

/// Read and parse an optional env var, falling back to `default` when unset.
pub fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key)? {
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        None => Ok(default),
    }
}

/// Read an optional boolean env var ("true"/"false"), falling back to
/// `default` when unset.
pub fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false': {e}"),
        }),
        None => Ok(default),
    }
}

/// Read a required env var, producing `ConfigError::MissingRequired` with
/// the given hint when it's absent.
pub fn required_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    optional_env(key)?.ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}
