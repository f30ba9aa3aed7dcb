use std::error::Error;

use crate::handlers::HandlerError;
use crate::keys::RegistryError;

/// Base trait for library errors surfaced to the CLI.
pub trait PulseError: Error + Send + Sync + 'static {
    /// Stable code for logs and scripts.
    fn error_code(&self) -> &'static str;

    /// Whether the user can fix this (bad config, bad input) rather than a bug or I/O fault.
    fn is_user_error(&self) -> bool {
        false
    }
}

pub type PulseResult<T> = Result<T, Box<dyn PulseError>>;

impl PulseError for pulse_config::ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            pulse_config::ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            pulse_config::ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            pulse_config::ConfigError::PathError { .. } => "CONFIG_PATH_ERROR",
            pulse_config::ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            pulse_config::ConfigError::ConfigParseError { .. }
                | pulse_config::ConfigError::InvalidConfiguration { .. }
        )
    }
}

impl PulseError for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            RegistryError::DuplicateKey { .. } => "DUPLICATE_REFRESH_KEY",
            RegistryError::ZeroInterval { .. } => "ZERO_REFRESH_INTERVAL",
            RegistryError::UnknownHandlerKey { .. } => "UNKNOWN_HANDLER_KEY",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}

impl PulseError for HandlerError {
    fn error_code(&self) -> &'static str {
        match self {
            HandlerError::Failed(_) => "HANDLER_FAILED",
            HandlerError::Panicked(_) => "HANDLER_PANICKED",
            HandlerError::Other(_) => "HANDLER_ERROR",
        }
    }
}
