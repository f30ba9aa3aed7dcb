//! # pulse-config
//!
//! TOML configuration types, loading, and validation for pulse.
//!
//! Single source of truth for the refresh interval table, the manual key list,
//! command-backed handler settings and the backoff policy. Depends only on
//! `pulse-paths`.

mod defaults;
mod loading;
mod validation;

pub mod errors;
pub mod types;

// Public API re-exports
pub use errors::ConfigError;
pub use loading::{load_config_file, load_hierarchy, merge_configs};
pub use types::{BackoffConfig, HandlerSettings, PulseConfig, RefreshConfig};
pub use validation::validate_config;

impl PulseConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy(explicit: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        loading::load_hierarchy(explicit)
    }

    /// Validate the configuration.
    ///
    /// See [`validation::validate_config`] for details.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
