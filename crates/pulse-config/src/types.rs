//! Configuration type definitions for pulse.
//!
//! These types are serialized/deserialized from TOML config files.
//!
//! # Example Configuration
//!
//! ```toml
//! [refresh]
//! auto_enabled = true
//! manual = ["execution_settings", "contract_sync"]
//!
//! [refresh.intervals]
//! bridge_status = 5000
//! account_summary = 15000
//!
//! [handlers.bridge_status]
//! command = "curl -fsS http://localhost:8000/api/bridge/status"
//! force_command = "curl -fsS -X POST http://localhost:8000/api/bridge/refresh"
//!
//! [backoff]
//! exit_code = 75
//! default_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::defaults;

/// Main configuration loaded from TOML config files.
///
/// Loaded from:
/// 1. User config: `~/.pulse/config.toml`
/// 2. Project config: `./.pulse/config.toml`
/// 3. An explicit `--config` file
///
/// Later layers override earlier ones. `PulseConfig::default()` carries the
/// dashboard key table; a parsed file starts empty and only adds what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Command-backed handlers keyed by refresh key.
    #[serde(default)]
    pub handlers: HashMap<String, HandlerSettings>,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshConfig {
                auto_enabled: Some(true),
                intervals: defaults::dashboard_intervals(),
                manual: defaults::dashboard_manual_keys(),
            },
            handlers: HashMap::new(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// The key table: which resources refresh on a timer and which only on demand.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefreshConfig {
    /// Initial state of the global auto-refresh toggle.
    /// Default: true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_enabled: Option<bool>,

    /// Auto-refresh key -> interval in milliseconds.
    #[serde(default)]
    pub intervals: BTreeMap<String, u64>,

    /// Manual-only keys (no timer).
    #[serde(default)]
    pub manual: Vec<String>,
}

impl RefreshConfig {
    pub fn auto_enabled(&self) -> bool {
        self.auto_enabled.unwrap_or(true)
    }

    /// Merge two refresh tables, with `override_config` taking precedence.
    ///
    /// A key named by the override moves to whichever side the override puts
    /// it on, so a project can turn a timed key into a manual one.
    pub fn merge(base: &Self, override_config: &Self) -> Self {
        let mut intervals = base.intervals.clone();
        let mut manual = base.manual.clone();

        for key in &override_config.manual {
            intervals.remove(key);
            if !manual.contains(key) {
                manual.push(key.clone());
            }
        }
        for (key, ms) in &override_config.intervals {
            manual.retain(|m| m != key);
            intervals.insert(key.clone(), *ms);
        }

        Self {
            auto_enabled: override_config.auto_enabled.or(base.auto_enabled),
            intervals,
            manual,
        }
    }
}

/// Shell commands backing one refresh key.
///
/// Used in `[handlers.<key>]` sections of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSettings {
    /// Command run through `sh -c` on every refresh.
    pub command: String,

    /// Command run instead of `command` for a forced refresh that bypasses the
    /// backend's own rate limiting. Only meaningful for the bridge status key.
    #[serde(default)]
    pub force_command: Option<String>,
}

/// How handler commands report backend backoff.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackoffConfig {
    /// Exit code meaning "the backend asked callers to slow down".
    /// Default: 75.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Length of the backoff window opened by that exit code, in seconds.
    /// Default: 30.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_secs: Option<u64>,
}

impl BackoffConfig {
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(defaults::DEFAULT_BACKOFF_EXIT_CODE)
    }

    pub fn default_secs(&self) -> u64 {
        self.default_secs.unwrap_or(defaults::DEFAULT_BACKOFF_SECS)
    }

    pub fn merge(base: &Self, override_config: &Self) -> Self {
        Self {
            exit_code: override_config.exit_code.or(base.exit_code),
            default_secs: override_config.default_secs.or(base.default_secs),
        }
    }
}
