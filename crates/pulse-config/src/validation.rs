//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::PulseConfig;

/// Validate a PulseConfig, returning an error if any values are invalid.
///
/// # Validation Rules
///
/// - Every auto-refresh interval must be greater than zero
/// - A key cannot be both auto and manual, and manual keys must be unique
/// - Every handler must belong to a registered key and have a non-empty command
/// - The backoff window length must be greater than zero
pub fn validate_config(config: &PulseConfig) -> Result<(), ConfigError> {
    for (key, ms) in &config.refresh.intervals {
        if key.trim().is_empty() {
            return Err(invalid("refresh key names cannot be empty".to_string()));
        }
        if *ms == 0 {
            return Err(invalid(format!(
                "interval for '{}' must be greater than 0 ms",
                key
            )));
        }
    }

    for (i, key) in config.refresh.manual.iter().enumerate() {
        if key.trim().is_empty() {
            return Err(invalid("refresh key names cannot be empty".to_string()));
        }
        if config.refresh.intervals.contains_key(key) {
            return Err(invalid(format!(
                "'{}' is listed as both an auto-refresh and a manual key",
                key
            )));
        }
        if config.refresh.manual[..i].contains(key) {
            return Err(invalid(format!("manual key '{}' is listed twice", key)));
        }
    }

    for (key, handler) in &config.handlers {
        let registered =
            config.refresh.intervals.contains_key(key) || config.refresh.manual.contains(key);
        if !registered {
            return Err(invalid(format!(
                "handler '{}' does not match any refresh key",
                key
            )));
        }
        if handler.command.trim().is_empty() {
            return Err(invalid(format!("handler '{}' has an empty command", key)));
        }
    }

    if config.backoff.default_secs() == 0 {
        return Err(invalid(
            "backoff.default_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::InvalidConfiguration { message }
}
