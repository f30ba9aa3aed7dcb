//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - The dashboard key table
//! 2. **User config** - `~/.pulse/config.toml`
//! 3. **Project config** - `./.pulse/config.toml`
//! 4. **Explicit file** - `--config <path>` (highest priority)

use crate::errors::ConfigError;
use crate::types::{BackoffConfig, PulseConfig, RefreshConfig};
use crate::validation::validate_config;
use pulse_paths::PulsePaths;
use std::fs;
use std::path::Path;

/// Load configuration from the hierarchy of config files.
///
/// Missing user and project files are not errors. An explicitly requested
/// file must exist.
///
/// # Errors
///
/// Returns an error if a present file fails to parse or the merged result
/// fails validation.
pub fn load_hierarchy(explicit: Option<&Path>) -> Result<PulseConfig, ConfigError> {
    let mut config = PulseConfig::default();

    // Load user config (file not found is expected, parse errors fail)
    match load_user_config() {
        Ok(user_config) => config = merge_configs(config, user_config),
        Err(e) if !e.is_file_not_found() => return Err(e),
        Err(_) => {}
    }

    // Load project config (file not found is expected, parse errors fail)
    match load_project_config() {
        Ok(project_config) => config = merge_configs(config, project_config),
        Err(e) if !e.is_file_not_found() => return Err(e),
        Err(_) => {}
    }

    if let Some(path) = explicit {
        config = merge_configs(config, load_config_file(path)?);
    }

    validate_config(&config)?;

    tracing::debug!(
        event = "config.load_completed",
        auto_keys = config.refresh.intervals.len(),
        manual_keys = config.refresh.manual.len(),
        handlers = config.handlers.len(),
    );

    Ok(config)
}

/// Load the user configuration from ~/.pulse/config.toml.
fn load_user_config() -> Result<PulseConfig, ConfigError> {
    let paths = PulsePaths::resolve()?;
    load_config_file(&paths.user_config())
}

/// Load the project configuration from ./.pulse/config.toml.
fn load_project_config() -> Result<PulseConfig, ConfigError> {
    let project_root = std::env::current_dir()?;
    load_config_file(&PulsePaths::project_config(&project_root))
}

/// Load a configuration file from the given path.
pub fn load_config_file(path: &Path) -> Result<PulseConfig, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|e| std::io::Error::new(e.kind(), format!("'{}': {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Merge two configurations, with override_config taking precedence.
///
/// Handler entries are merged per key with the override winning.
pub fn merge_configs(base: PulseConfig, override_config: PulseConfig) -> PulseConfig {
    PulseConfig {
        refresh: RefreshConfig::merge(&base.refresh, &override_config.refresh),
        handlers: {
            let mut merged = base.handlers;
            for (key, value) in override_config.handlers {
                merged.insert(key, value);
            }
            merged
        },
        backoff: BackoffConfig::merge(&base.backoff, &override_config.backoff),
    }
}
