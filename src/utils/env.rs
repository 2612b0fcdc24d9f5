//! Helpers for reading typed configuration values from environment variables.

use std::str::FromStr;

use crate::error::ConfigError;

/// Parses an environment variable value into the requested type.
pub fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Parses a boolean environment variable value.
///
/// Accepts `true`/`false`, `1`/`0`, `yes`/`no` and `on`/`off`.
pub fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Reads `key` from the environment and parses it when present.
pub fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => parse_env_value(&val, key).map(Some),
        Err(_) => Ok(None),
    }
}

/// Reads a boolean `key` from the environment when present.
pub fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => parse_env_bool(&val, key).map(Some),
        Err(_) => Ok(None),
    }
}
