//! Resource key registry.
//!
//! Enumerates every refreshable resource and splits them into auto-refresh
//! keys (bound to a fixed interval for the life of the process) and
//! manual-only keys (no timer).

use std::collections::BTreeMap;
use std::fmt;

use pulse_config::RefreshConfig;
use serde::{Deserialize, Serialize};

/// Opaque identifier for a refreshable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshKey(String);

impl RefreshKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RefreshKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for RefreshKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for RefreshKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a key is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyKind {
    /// Refreshed by a periodic timer every `interval_ms`.
    Auto { interval_ms: u64 },
    /// Refreshed only by explicit action.
    Manual,
}

impl KeyKind {
    pub fn interval_ms(&self) -> Option<u64> {
        match self {
            KeyKind::Auto { interval_ms } => Some(*interval_ms),
            KeyKind::Manual => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KeyKind::Auto { .. } => "auto",
            KeyKind::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("refresh key '{key}' is registered more than once")]
    DuplicateKey { key: String },

    #[error("refresh key '{key}' has a zero interval")]
    ZeroInterval { key: String },

    #[error("handler registered for unknown refresh key '{key}'")]
    UnknownHandlerKey { key: String },
}

/// The static key table, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: BTreeMap<RefreshKey, KeyKind>,
}

impl KeyRegistry {
    /// Build a registry from auto keys with their intervals and a manual key list.
    ///
    /// # Errors
    ///
    /// Fails if a key appears twice (including once on each side) or an
    /// interval is zero.
    pub fn new<A, M>(auto: A, manual: M) -> Result<Self, RegistryError>
    where
        A: IntoIterator<Item = (RefreshKey, u64)>,
        M: IntoIterator<Item = RefreshKey>,
    {
        let mut keys = BTreeMap::new();

        for (key, interval_ms) in auto {
            if interval_ms == 0 {
                return Err(RegistryError::ZeroInterval {
                    key: key.to_string(),
                });
            }
            if keys.contains_key(&key) {
                return Err(RegistryError::DuplicateKey {
                    key: key.to_string(),
                });
            }
            keys.insert(key, KeyKind::Auto { interval_ms });
        }

        for key in manual {
            if keys.contains_key(&key) {
                return Err(RegistryError::DuplicateKey {
                    key: key.to_string(),
                });
            }
            keys.insert(key, KeyKind::Manual);
        }

        Ok(Self { keys })
    }

    /// Build a registry from the `[refresh]` section of the configuration.
    pub fn from_config(config: &RefreshConfig) -> Result<Self, RegistryError> {
        Self::new(
            config
                .intervals
                .iter()
                .map(|(key, ms)| (RefreshKey::new(key.as_str()), *ms)),
            config.manual.iter().map(|key| RefreshKey::new(key.as_str())),
        )
    }

    pub fn kind(&self, key: &RefreshKey) -> Option<KeyKind> {
        self.keys.get(key).copied()
    }

    pub fn interval_ms(&self, key: &RefreshKey) -> Option<u64> {
        self.kind(key).and_then(|kind| kind.interval_ms())
    }

    pub fn contains(&self, key: &RefreshKey) -> bool {
        self.keys.contains_key(key)
    }

    /// All keys in stable (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&RefreshKey, KeyKind)> {
        self.keys.iter().map(|(key, kind)| (key, *kind))
    }

    /// Auto keys with their intervals.
    pub fn auto_keys(&self) -> impl Iterator<Item = (&RefreshKey, u64)> {
        self.keys
            .iter()
            .filter_map(|(key, kind)| kind.interval_ms().map(|ms| (key, ms)))
    }

    pub fn manual_keys(&self) -> impl Iterator<Item = &RefreshKey> {
        self.keys
            .iter()
            .filter(|(_, kind)| matches!(kind, KeyKind::Manual))
            .map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
