//! Built-in defaults describing the live-trading dashboard.

use std::collections::BTreeMap;

/// Auto-refresh keys and their intervals in milliseconds.
pub(crate) const DASHBOARD_INTERVALS: [(&str, u64); 7] = [
    ("connection", 30_000),
    ("bridge_status", 5_000),
    ("account_summary", 15_000),
    ("positions", 15_000),
    ("monitor", 10_000),
    ("market_snapshot", 10_000),
    ("market_health", 60_000),
];

/// Keys refreshed only on explicit action.
pub(crate) const DASHBOARD_MANUAL_KEYS: [&str; 2] = ["execution_settings", "contract_sync"];

/// Exit code a handler command uses to report that the backend asked callers to slow down.
/// Matches `EX_TEMPFAIL` from sysexits.h.
pub(crate) const DEFAULT_BACKOFF_EXIT_CODE: i32 = 75;

pub(crate) const DEFAULT_BACKOFF_SECS: u64 = 30;

pub(crate) fn dashboard_intervals() -> BTreeMap<String, u64> {
    DASHBOARD_INTERVALS
        .iter()
        .map(|(key, ms)| (key.to_string(), *ms))
        .collect()
}

pub(crate) fn dashboard_manual_keys() -> Vec<String> {
    DASHBOARD_MANUAL_KEYS.iter().map(|k| k.to_string()).collect()
}
