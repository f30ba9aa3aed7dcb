//! End-to-end behavior of the scheduler through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::{Ready, ready};
use pulse_core::{
    BackoffSource, BackoffWindow, Clock, HandlerError, HandlerResult, HandlerTable, KeyRegistry,
    ManualClock, RefreshKey, Scheduler, TriggerOutcome, TriggerSource,
};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Epoch milliseconds measured on tokio's (pausable) clock.
struct TokioClock {
    base: Instant,
}

impl TokioClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        Instant::now().duration_since(self.base).as_millis() as i64
    }
}

/// Backoff source whose value tests can move in either direction.
#[derive(Default)]
struct SettableBackoff(AtomicI64);

impl SettableBackoff {
    fn set(&self, until_ms: i64) {
        self.0.store(until_ms, Ordering::SeqCst);
    }
}

impl BackoffSource for SettableBackoff {
    fn backoff_until_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn key(name: &str) -> RefreshKey {
    RefreshKey::from(name)
}

fn registry() -> KeyRegistry {
    KeyRegistry::new(
        [(key("A"), 5_000), (key("B"), 10_000)],
        [key("settings")],
    )
    .unwrap()
}

fn counter(calls: &Arc<AtomicUsize>) -> impl Fn() -> Ready<HandlerResult> + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        ready(Ok(()))
    }
}

async fn panicking() -> HandlerResult {
    panic!("unexpected payload")
}

#[tokio::test]
async fn concurrent_triggers_for_one_key_run_the_handler_once() {
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let handlers = {
        let gate = gate.clone();
        let calls = calls.clone();
        HandlerTable::new().with("A", move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(())
            }
        })
    };
    let scheduler = Scheduler::builder(registry(), handlers).build().unwrap();
    let a = key("A");

    let first = scheduler.trigger_refresh(&a, TriggerSource::Auto);
    let second = async {
        while !scheduler.is_in_flight(&a) {
            tokio::task::yield_now().await;
        }
        let outcome = scheduler.trigger_refresh(&a, TriggerSource::Manual).await;
        gate.notify_one();
        outcome
    };

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first, TriggerOutcome::Completed);
    assert_eq!(second, TriggerOutcome::AlreadyInFlight);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!scheduler.is_in_flight(&a));
}

#[tokio::test]
async fn backoff_defers_auto_trigger_without_calling_handler() {
    let clock = Arc::new(ManualClock::new(2_000));
    let window = Arc::new(BackoffWindow::new());
    window.advance_until(4_000);
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(clock)
        .backoff(window)
        .build()
        .unwrap();

    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Auto).await;

    assert_eq!(outcome, TriggerOutcome::Deferred { until_ms: 4_000 });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let meta = scheduler.meta(&key("A")).unwrap();
    assert_eq!(meta.next_at, Some(4_000));
    assert_eq!(meta.last_at, None);
}

#[tokio::test]
async fn backoff_keeps_a_later_existing_next_at() {
    let clock = Arc::new(ManualClock::new(0));
    let window = Arc::new(BackoffWindow::new());
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("B", || async { Ok(()) }))
        .clock(clock.clone())
        .backoff(window.clone())
        .build()
        .unwrap();

    scheduler.trigger_refresh(&key("B"), TriggerSource::Manual).await;
    assert_eq!(scheduler.meta(&key("B")).unwrap().next_at, Some(10_000));

    clock.set(2_000);
    window.advance_until(4_000);
    scheduler.trigger_refresh(&key("B"), TriggerSource::Auto).await;
    assert_eq!(scheduler.meta(&key("B")).unwrap().next_at, Some(10_000));
}

#[tokio::test]
async fn manual_trigger_bypasses_backoff() {
    let clock = Arc::new(ManualClock::new(2_000));
    let window = Arc::new(BackoffWindow::new());
    window.advance_until(4_000);
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(clock)
        .backoff(window)
        .build()
        .unwrap();

    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Manual).await;

    assert_eq!(outcome, TriggerOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn later_deferral_cannot_move_deadline_earlier() {
    let clock = Arc::new(ManualClock::new(1_000));
    let backoff = Arc::new(SettableBackoff::default());
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", || async { Ok(()) }))
        .clock(clock.clone())
        .backoff(backoff.clone())
        .build()
        .unwrap();

    backoff.set(6_000);
    scheduler.trigger_refresh(&key("A"), TriggerSource::Auto).await;
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(6_000));

    clock.set(2_000);
    backoff.set(3_000);
    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Auto).await;
    assert_eq!(outcome, TriggerOutcome::Deferred { until_ms: 6_000 });
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(6_000));
}

#[tokio::test]
async fn failing_and_panicking_handlers_still_release_and_record() {
    let clock = Arc::new(ManualClock::new(3_000));
    let handlers = HandlerTable::new()
        .with("A", || async { Err(HandlerError::failed("connection reset")) })
        .with("B", panicking);
    let scheduler = Scheduler::builder(registry(), handlers)
        .clock(clock)
        .build()
        .unwrap();

    for name in ["A", "B"] {
        let outcome = scheduler.trigger_refresh(&key(name), TriggerSource::Auto).await;
        assert_eq!(outcome, TriggerOutcome::Failed);
        assert!(!scheduler.is_in_flight(&key(name)));
        assert_eq!(scheduler.meta(&key(name)).unwrap().last_at, Some(3_000));
    }

    // The key can run again right away.
    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Manual).await;
    assert_eq!(outcome, TriggerOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn reenabling_rebases_every_auto_key_at_once() {
    let clock = Arc::new(ManualClock::new(0));
    let handlers = HandlerTable::new()
        .with("A", || async { Ok(()) })
        .with("B", || async { Ok(()) });
    let scheduler = Scheduler::builder(registry(), handlers)
        .clock(clock.clone())
        .build()
        .unwrap();
    scheduler.start();

    clock.set(3_000);
    scheduler.set_auto_refresh(false);
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(5_000));
    assert_eq!(scheduler.meta(&key("B")).unwrap().next_at, Some(10_000));

    clock.set(4_200);
    scheduler.set_auto_refresh(true);
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(9_200));
    assert_eq!(scheduler.meta(&key("B")).unwrap().next_at, Some(14_200));
    assert_eq!(scheduler.meta(&key("settings")).unwrap().next_at, None);

    scheduler.shutdown();
}

#[tokio::test]
async fn scenario_auto_defers_and_manual_runs_inside_window() {
    let clock = Arc::new(ManualClock::new(0));
    let window = Arc::new(BackoffWindow::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(clock.clone())
        .backoff(window.clone())
        .build()
        .unwrap();

    clock.set(1_000);
    window.advance_until(4_000);
    clock.set(2_000);

    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Auto).await;
    assert_eq!(outcome, TriggerOutcome::Deferred { until_ms: 4_000 });
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(4_000));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Manual).await;
    assert_eq!(outcome, TriggerOutcome::Completed);
    let meta = scheduler.meta(&key("A")).unwrap();
    assert_eq!(meta.last_at, Some(2_000));
    assert_eq!(meta.next_at, Some(7_000));
    assert_eq!(meta.effective_next_at(), Some(7_000));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_all_isolates_failures_and_clears_loading() {
    let clock = Arc::new(ManualClock::new(8_000));
    let gate = Arc::new(Notify::new());
    let handlers = {
        let gate = gate.clone();
        HandlerTable::new()
            .with("A", || async { Err(HandlerError::failed("500")) })
            .with("B", panicking)
            .with("settings", move || {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok(())
                }
            })
    };
    let scheduler = Scheduler::builder(registry(), handlers)
        .clock(clock)
        .build()
        .unwrap();

    let all = scheduler.refresh_all(false);
    let observer = async {
        while !scheduler.is_in_flight(&key("settings")) {
            tokio::task::yield_now().await;
        }
        let loading = scheduler.is_loading();
        gate.notify_one();
        loading
    };
    let (summary, loading_during) = tokio::join!(all, observer);

    assert!(loading_during);
    assert!(!scheduler.is_loading());
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.skipped, 0);
    for status in scheduler.snapshot() {
        assert_eq!(status.meta.last_at, Some(8_000), "{}", status.key);
        assert!(!status.in_flight);
    }
}

#[tokio::test]
async fn refresh_all_skips_keys_already_running() {
    let gate = Arc::new(Notify::new());
    let b_calls = Arc::new(AtomicUsize::new(0));
    let handlers = {
        let gate = gate.clone();
        HandlerTable::new()
            .with("A", move || {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok(())
                }
            })
            .with("B", counter(&b_calls))
    };
    let scheduler = Scheduler::builder(registry(), handlers).build().unwrap();
    let a = key("A");

    let running = scheduler.trigger_refresh(&a, TriggerSource::Auto);
    let all = async {
        while !scheduler.is_in_flight(&a) {
            tokio::task::yield_now().await;
        }
        let summary = scheduler.refresh_all(false).await;
        gate.notify_one();
        summary
    };
    let (running, summary) = tokio::join!(running, all);

    assert_eq!(running, TriggerOutcome::Completed);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timers_fire_at_each_interval() {
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let handlers = HandlerTable::new()
        .with("A", counter(&a_calls))
        .with("B", counter(&b_calls));
    let scheduler = Scheduler::builder(registry(), handlers)
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(5_600)).await;
    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);

    let a = scheduler.meta(&key("A")).unwrap();
    assert_eq!(a.last_at, Some(10_000));
    assert_eq!(a.next_at, Some(15_000));

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_moves_the_next_automatic_tick() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    let outcome = scheduler.trigger_refresh(&key("A"), TriggerSource::Manual).await;
    assert_eq!(outcome, TriggerOutcome::Completed);
    let meta = scheduler.meta(&key("A")).unwrap();
    assert_eq!(meta.last_at, Some(2_000));
    assert_eq!(meta.effective_next_at(), Some(7_000));

    // The original 5s tick must not fire on top of the manual refresh.
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let meta = scheduler.meta(&key("A")).unwrap();
    assert_eq!(meta.last_at, Some(7_000));
    assert_eq!(meta.next_at, Some(12_000));

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn refresh_all_rebases_every_armed_timer() {
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let handlers = HandlerTable::new()
        .with("A", counter(&a_calls))
        .with("B", counter(&b_calls));
    let scheduler = Scheduler::builder(registry(), handlers)
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    let summary = scheduler.refresh_all(false).await;
    assert_eq!(summary.completed, 2);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);

    // B was re-based to 14s by the refresh-all, not its original 10s.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.meta(&key("B")).unwrap().last_at, Some(14_000));

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn tick_during_manual_run_waits_for_it_to_finish() {
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let handlers = {
        let gate = gate.clone();
        let calls = calls.clone();
        HandlerTable::new().with("A", move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let gate = gate.clone();
            async move {
                // Only the first (manual) run blocks.
                if n == 0 {
                    gate.notified().await;
                }
                Ok(())
            }
        })
    };
    let scheduler = Scheduler::builder(registry(), handlers)
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    let manual = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .trigger_refresh(&RefreshKey::from("A"), TriggerSource::Manual)
                .await
        }
    });

    // The 5s tick lands while the manual run is still going.
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    assert_eq!(manual.await.unwrap(), TriggerOutcome::Completed);
    assert_eq!(scheduler.meta(&key("A")).unwrap().last_at, Some(6_000));

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn reenabling_after_shutdown_does_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();
    scheduler.set_auto_refresh(false);
    scheduler.shutdown();
    assert!(scheduler.is_shut_down());

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    scheduler.set_auto_refresh(true);
    scheduler.start();
    assert!(!scheduler.auto_refresh_enabled());
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(5_000));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn deferred_tick_wakes_when_window_closes() {
    let clock = TokioClock::new();
    let window = Arc::new(BackoffWindow::new());
    window.advance_until(7_000);
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(clock)
        .backoff(window)
        .build()
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(6_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, Some(7_000));

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.meta(&key("A")).unwrap().last_at, Some(7_000));

    // Cadence resumes from the retry.
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn disabling_auto_refresh_stops_timers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();
    scheduler.set_auto_refresh(false);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    scheduler.set_auto_refresh(true);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.shutdown();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_last_handle_stops_timers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(TokioClock::new())
        .build()
        .unwrap();
    scheduler.start();
    drop(scheduler);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn auto_disabled_at_build_arms_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::builder(registry(), HandlerTable::new().with("A", counter(&calls)))
        .clock(TokioClock::new())
        .auto_enabled(false)
        .build()
        .unwrap();
    scheduler.start();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, None);

    scheduler.trigger_refresh(&key("A"), TriggerSource::Manual).await;
    assert_eq!(scheduler.meta(&key("A")).unwrap().next_at, None);
}
