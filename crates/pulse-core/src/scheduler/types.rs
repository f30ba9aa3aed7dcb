use serde::Serialize;

use crate::keys::{KeyKind, RefreshKey};
use crate::meta::RefreshMeta;

/// Who asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// A periodic timer tick. Subject to the backoff gate.
    Auto,
    /// A user action or a related explicit refresh. Never gated.
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Auto => write!(f, "auto"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

/// How a trigger was accounted for. Informational only; never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No handler is registered for the key.
    Unregistered,
    /// Automatic trigger inside a backoff window; `next_at` moved to `until_ms`.
    Deferred { until_ms: i64 },
    /// The key was already running; this trigger was dropped.
    AlreadyInFlight,
    /// The handler ran and returned `Ok`.
    Completed,
    /// The handler ran and returned `Err` or panicked.
    Failed,
}

impl TriggerOutcome {
    /// Whether the handler actually ran.
    pub fn executed(&self) -> bool {
        matches!(self, TriggerOutcome::Completed | TriggerOutcome::Failed)
    }
}

/// One row of [`Scheduler::snapshot`](super::Scheduler::snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub key: RefreshKey,
    #[serde(flatten)]
    pub kind: KeyKind,
    pub meta: RefreshMeta,
    pub in_flight: bool,
    pub has_handler: bool,
}

/// Tally of one `refresh_all` fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshAllSummary {
    pub completed: usize,
    pub failed: usize,
    /// Keys that were already in flight.
    pub skipped: usize,
    /// Whether the forced variant ran in place of its key's regular handler.
    pub forced: bool,
}

impl RefreshAllSummary {
    pub(crate) fn record(&mut self, outcome: TriggerOutcome) {
        match outcome {
            TriggerOutcome::Completed => self.completed += 1,
            TriggerOutcome::Failed => self.failed += 1,
            TriggerOutcome::AlreadyInFlight => self.skipped += 1,
            TriggerOutcome::Unregistered | TriggerOutcome::Deferred { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executed() {
        assert!(TriggerOutcome::Completed.executed());
        assert!(TriggerOutcome::Failed.executed());
        assert!(!TriggerOutcome::AlreadyInFlight.executed());
        assert!(!TriggerOutcome::Deferred { until_ms: 1 }.executed());
        assert!(!TriggerOutcome::Unregistered.executed());
    }

    #[test]
    fn test_summary_record() {
        let mut summary = RefreshAllSummary::default();
        summary.record(TriggerOutcome::Completed);
        summary.record(TriggerOutcome::Completed);
        summary.record(TriggerOutcome::Failed);
        summary.record(TriggerOutcome::AlreadyInFlight);
        summary.record(TriggerOutcome::Unregistered);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_key_status_serializes_flat_kind() {
        let status = KeyStatus {
            key: RefreshKey::from("positions"),
            kind: KeyKind::Auto { interval_ms: 15_000 },
            meta: RefreshMeta {
                interval_ms: Some(15_000),
                last_at: Some(1),
                next_at: Some(15_001),
            },
            in_flight: false,
            has_handler: true,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["key"], "positions");
        assert_eq!(json["kind"], "auto");
        assert_eq!(json["meta"]["next_at"], 15_001);
    }

    #[test]
    fn test_trigger_source_display() {
        assert_eq!(TriggerSource::Auto.to_string(), "auto");
        assert_eq!(TriggerSource::Manual.to_string(), "manual");
    }
}
