//! Per-key timer tasks.
//!
//! Each auto key gets one task that sleeps until the key's next refresh time
//! as recorded in the metadata store and then fires an automatic trigger. Any
//! finished attempt on the key, whoever started it, wakes the task so it
//! re-reads the deadline. A deferred trigger pushes that deadline to the end
//! of the backoff window, so the retry happens there.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Scheduler, SchedulerInner, TriggerOutcome, TriggerSource};
use crate::keys::RefreshKey;

pub(super) async fn run_key_timer(
    inner: Weak<SchedulerInner>,
    key: RefreshKey,
    interval_ms: u64,
    wakeup: Arc<Notify>,
    cancel: CancellationToken,
) {
    debug!(
        event = "core.scheduler.timer_started",
        key = %key,
        interval_ms = interval_ms,
    );

    loop {
        let Some(scheduler) = upgrade(&inner) else {
            break;
        };
        let wait = until_due(&scheduler, &key, interval_ms);
        drop(scheduler);

        tokio::select! {
            _ = cancel.cancelled() => break,
            // Another run finished; the deadline may have moved.
            _ = wakeup.notified() => continue,
            _ = tokio::time::sleep(wait) => {}
        }

        let Some(scheduler) = upgrade(&inner) else {
            break;
        };
        match scheduler.trigger_refresh(&key, TriggerSource::Auto).await {
            TriggerOutcome::Deferred { until_ms } => {
                info!(
                    event = "core.scheduler.timer_deferred",
                    key = %key,
                    until_ms = until_ms,
                );
            }
            TriggerOutcome::AlreadyInFlight => {
                drop(scheduler);
                // The running attempt wakes us when it finishes.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = wakeup.notified() => {}
                }
            }
            TriggerOutcome::Unregistered => break,
            TriggerOutcome::Completed | TriggerOutcome::Failed => {}
        }
    }

    debug!(event = "core.scheduler.timer_stopped", key = %key);
}

/// Time left until the key's next refresh. Falls back to a full interval when
/// the metadata holds no deadline.
fn until_due(scheduler: &Scheduler, key: &RefreshKey, interval_ms: u64) -> Duration {
    let now = scheduler.now_ms();
    scheduler
        .meta(key)
        .and_then(|meta| meta.next_refresh_in(now))
        .unwrap_or(Duration::from_millis(interval_ms))
}

fn upgrade(inner: &Weak<SchedulerInner>) -> Option<Scheduler> {
    inner.upgrade().map(|inner: Arc<SchedulerInner>| Scheduler { inner })
}
