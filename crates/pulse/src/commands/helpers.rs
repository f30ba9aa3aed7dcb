use std::path::PathBuf;

use clap::ArgMatches;
use tracing::{error, warn};

use pulse_core::errors::PulseError;
use pulse_core::{ConfigError, PulseConfig, events};

use crate::color;

fn explicit_config(matches: &ArgMatches) -> Option<PathBuf> {
    matches.get_one::<PathBuf>("config").cloned()
}

/// Load configuration, reporting failures to the user.
///
/// Used by commands that must not run on a guessed key table.
pub fn load_config_or_report(matches: &ArgMatches) -> Result<PulseConfig, ConfigError> {
    let explicit = explicit_config(matches);
    PulseConfig::load_hierarchy(explicit.as_deref()).inspect_err(|e| {
        eprintln!("{} {}", color::error("Configuration error:"), e);
        if e.is_user_error() {
            eprintln!(
                "{}",
                color::hint("Tip: Check ~/.pulse/config.toml and ./.pulse/config.toml.")
            );
        }
        error!(
            event = "cli.config.load_failed",
            error = %e,
            error_code = e.error_code(),
        );
        events::log_app_error(e);
    })
}

/// Load configuration with warning on errors.
///
/// Falls back to the built-in dashboard table if loading fails, but notifies
/// the user on stderr and through `cli.config.load_failed`.
pub fn load_config_with_warning(matches: &ArgMatches) -> PulseConfig {
    let explicit = explicit_config(matches);
    match PulseConfig::load_hierarchy(explicit.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{}",
                color::warning(&format!(
                    "Warning: Could not load config: {}. Using defaults.",
                    e
                ))
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                error_code = e.error_code(),
            );
            PulseConfig::default()
        }
    }
}
