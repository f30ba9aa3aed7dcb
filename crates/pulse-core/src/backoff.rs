//! Backoff gate.
//!
//! The transport layer owns a process-wide "backoff until" timestamp, set when
//! the backend asks callers to slow down. Automatic refreshes landing inside
//! that window are deferred; manual refreshes always go through.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::scheduler::TriggerSource;

/// Read side of the backoff window.
///
/// `0` or a timestamp in the past means no backoff is in effect.
pub trait BackoffSource: Send + Sync + 'static {
    /// Epoch milliseconds before which automatic refreshes must not run.
    fn backoff_until_ms(&self) -> i64;
}

/// Source that never reports backoff.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffSource for NoBackoff {
    fn backoff_until_ms(&self) -> i64 {
        0
    }
}

/// Shared backoff window owned by the transport side.
///
/// Only ever moves forward: a shorter window reported later cannot cut an
/// earlier, longer one short.
#[derive(Debug, Default)]
pub struct BackoffWindow {
    until_ms: AtomicI64,
}

impl BackoffWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the window to at least `until_ms`. Returns the effective deadline.
    pub fn advance_until(&self, until_ms: i64) -> i64 {
        let previous = self.until_ms.fetch_max(until_ms, Ordering::SeqCst);
        let effective = previous.max(until_ms);
        if effective > previous {
            tracing::info!(
                event = "core.backoff.window_extended",
                until_ms = effective,
                previous_ms = previous,
            );
        }
        effective
    }

    /// Open a window from a rate-limit response with a retry-after hint.
    pub fn note_rate_limited(&self, now_ms: i64, retry_after: Duration) -> i64 {
        let retry_ms = i64::try_from(retry_after.as_millis()).unwrap_or(i64::MAX);
        self.advance_until(now_ms.saturating_add(retry_ms))
    }

    pub fn until_ms(&self) -> i64 {
        self.until_ms.load(Ordering::SeqCst)
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        now_ms < self.until_ms()
    }
}

impl BackoffSource for BackoffWindow {
    fn backoff_until_ms(&self) -> i64 {
        self.until_ms()
    }
}

/// What the gate decided for one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Defer { until_ms: i64 },
}

/// Decide whether a trigger may run now.
///
/// Only automatic triggers inside an active window are deferred.
pub fn check_gate(source: TriggerSource, now_ms: i64, backoff_until_ms: i64) -> GateDecision {
    match source {
        TriggerSource::Auto if now_ms < backoff_until_ms => GateDecision::Defer {
            until_ms: backoff_until_ms,
        },
        _ => GateDecision::Proceed,
    }
}
