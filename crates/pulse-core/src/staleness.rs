//! Staleness and explainability.
//!
//! A read-side projection over state the refresh handlers already committed.
//! Nothing here feeds back into scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Human-facing freshness of the dashboard as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Ok,
    Stale,
    Unknown,
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Staleness::Ok => write!(f, "ok"),
            Staleness::Stale => write!(f, "stale"),
            Staleness::Unknown => write!(f, "unknown"),
        }
    }
}

/// Payload returned by the bridge-status handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeStatus {
    pub status: Option<String>,
    pub stale: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_refresh_reason: Option<String>,
}

/// Everything the staleness policy looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalenessInputs {
    pub bridge: Option<BridgeStatus>,
    pub account_stale: bool,
    pub positions_stale: bool,
    pub stream_status: Option<String>,
}

impl StalenessInputs {
    fn stream_disconnected(&self) -> bool {
        self.stream_status
            .as_deref()
            .is_some_and(|status| status != "connected")
    }

    fn has_positive_signal(&self) -> bool {
        let bridge_signal = self
            .bridge
            .as_ref()
            .is_some_and(|b| b.status.is_some() || b.last_refresh_at.is_some());
        bridge_signal || self.stream_status.is_some()
    }
}

/// Resolve overall staleness. First matching rule wins:
///
/// 1. bridge reports `stale` -> `Stale`
/// 2. account or positions flagged stale, or stream not connected -> `Stale`
/// 3. any positive signal (status string, stream status, refresh timestamp) -> `Ok`
/// 4. otherwise `Unknown`
pub fn resolve(inputs: &StalenessInputs) -> Staleness {
    if inputs.bridge.as_ref().is_some_and(|b| b.stale) {
        return Staleness::Stale;
    }
    if inputs.account_stale || inputs.positions_stale || inputs.stream_disconnected() {
        return Staleness::Stale;
    }
    if inputs.has_positive_signal() {
        return Staleness::Ok;
    }
    Staleness::Unknown
}

/// Whole seconds since the last heartbeat, or `None` without one.
///
/// A heartbeat stamped in the future (clock skew) reads as zero.
pub fn heartbeat_age_secs(now_ms: i64, last_heartbeat_ms: Option<i64>) -> Option<i64> {
    last_heartbeat_ms.map(|last| (now_ms.saturating_sub(last) / 1_000).max(0))
}

/// One contributing cause of a `Stale` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StaleReason {
    Bridge { code: Option<String> },
    AccountSummary,
    Positions,
    Stream { status: String },
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::Bridge { code: Some(code) } => {
                write!(f, "bridge reports stale data: {}", explain_reason_code(code))
            }
            StaleReason::Bridge { code: None } => write!(f, "bridge reports stale data"),
            StaleReason::AccountSummary => write!(f, "account summary is stale"),
            StaleReason::Positions => write!(f, "positions are stale"),
            StaleReason::Stream { status } => write!(f, "stream is {}", status),
        }
    }
}

/// Human-readable text for a bridge `last_refresh_reason` code.
///
/// Unknown codes are returned as-is.
pub fn explain_reason_code(code: &str) -> String {
    let text = match code {
        "heartbeat_timeout" => "no heartbeat received within the expected window",
        "rate_limited" => "backend asked callers to slow down",
        "manual" => "refreshed on request",
        "scheduled" => "regular scheduled refresh",
        "startup" => "initial refresh after startup",
        "reconnect" => "refreshed after reconnecting",
        "upstream_error" => "upstream broker returned an error",
        other => return other.to_string(),
    };
    text.to_string()
}

/// Status plus its explanation, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StalenessReport {
    pub status: Staleness,
    pub reasons: Vec<StaleReason>,
    pub heartbeat_age_secs: Option<i64>,
}

impl StalenessReport {
    /// The reasons joined for a one-line hint. Empty when not stale.
    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Resolve status, collect reasons and compute heartbeat age in one pass.
pub fn evaluate(inputs: &StalenessInputs, now_ms: i64) -> StalenessReport {
    let mut reasons = Vec::new();

    if let Some(bridge) = inputs.bridge.as_ref().filter(|b| b.stale) {
        reasons.push(StaleReason::Bridge {
            code: bridge.last_refresh_reason.clone(),
        });
    }
    if inputs.account_stale {
        reasons.push(StaleReason::AccountSummary);
    }
    if inputs.positions_stale {
        reasons.push(StaleReason::Positions);
    }
    if inputs.stream_disconnected() {
        reasons.push(StaleReason::Stream {
            status: inputs.stream_status.clone().unwrap_or_default(),
        });
    }

    let last_heartbeat_ms = inputs
        .bridge
        .as_ref()
        .and_then(|b| b.last_heartbeat_at)
        .map(|at| at.timestamp_millis());

    StalenessReport {
        status: resolve(inputs),
        reasons,
        heartbeat_age_secs: heartbeat_age_secs(now_ms, last_heartbeat_ms),
    }
}
