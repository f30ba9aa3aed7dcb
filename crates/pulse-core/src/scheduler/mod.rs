//! Refresh scheduler.
//!
//! Owns the per-key timers, the manual "refresh all" path and the global
//! auto-refresh toggle. Every trigger goes through the backoff gate (automatic
//! triggers only) and the in-flight guard before reaching the handler table,
//! and every finished attempt is recorded in the metadata store.
//!
//! Per key the logical states are `Idle -> Scheduled -> Running -> Idle`. A
//! deferral leaves the key idle with `next_at` pushed out. There is no failed
//! state: a failing handler still advances `last_at`.

mod timers;
mod types;

pub use types::{KeyStatus, RefreshAllSummary, TriggerOutcome, TriggerSource};

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{self, BackoffSource, GateDecision, NoBackoff};
use crate::clock::{Clock, SystemClock};
use crate::handlers::{Handler, HandlerError, HandlerTable};
use crate::inflight::InFlightSet;
use crate::keys::{KeyRegistry, RefreshKey, RegistryError};
use crate::meta::{MetaStore, RefreshMeta};

/// Handle to a scheduler instance. Cheap to clone; all clones share state.
///
/// Timers are cancelled when [`shutdown`](Self::shutdown) is called or the
/// last handle is dropped. Handlers already running are never aborted.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    registry: KeyRegistry,
    handlers: HandlerTable,
    clock: Arc<dyn Clock>,
    backoff: Arc<dyn BackoffSource>,
    state: Mutex<SchedulerState>,
    /// Per auto key; signalled whenever an attempt on that key finishes.
    wakeups: HashMap<RefreshKey, Arc<Notify>>,
    /// Outstanding `refresh_all` calls. The view's loading flag is `loading > 0`.
    loading: AtomicUsize,
    shutdown: CancellationToken,
}

struct SchedulerState {
    meta: MetaStore,
    in_flight: InFlightSet,
    auto_enabled: bool,
    /// Token for the currently armed timer generation, if any.
    timers: Option<CancellationToken>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                error!(event = "core.scheduler.state_lock_poisoned");
                poisoned.into_inner()
            }
        }
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    registry: KeyRegistry,
    handlers: HandlerTable,
    clock: Arc<dyn Clock>,
    backoff: Arc<dyn BackoffSource>,
    auto_enabled: bool,
}

impl SchedulerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backoff(mut self, backoff: Arc<dyn BackoffSource>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Initial state of the global auto-refresh toggle. Default: enabled.
    pub fn auto_enabled(mut self, enabled: bool) -> Self {
        self.auto_enabled = enabled;
        self
    }

    /// # Errors
    ///
    /// Fails if a handler (or the forced handler) is registered for a key the
    /// registry does not know.
    pub fn build(self) -> Result<Scheduler, RegistryError> {
        let forced_key = self.handlers.forced().map(|(key, _)| key.clone());
        for key in self.handlers.keys().into_iter().chain(forced_key) {
            if !self.registry.contains(&key) {
                return Err(RegistryError::UnknownHandlerKey {
                    key: key.to_string(),
                });
            }
        }

        let meta = MetaStore::new(&self.registry);
        let wakeups = self
            .registry
            .auto_keys()
            .map(|(key, _)| (key.clone(), Arc::new(Notify::new())))
            .collect();

        debug!(
            event = "core.scheduler.build_completed",
            keys = self.registry.len(),
            handlers = self.handlers.len(),
            auto_enabled = self.auto_enabled,
        );

        Ok(Scheduler {
            inner: Arc::new(SchedulerInner {
                registry: self.registry,
                handlers: self.handlers,
                clock: self.clock,
                backoff: self.backoff,
                state: Mutex::new(SchedulerState {
                    meta,
                    in_flight: InFlightSet::new(),
                    auto_enabled: self.auto_enabled,
                    timers: None,
                }),
                wakeups,
                loading: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

/// Clears the in-flight marker and records the attempt when dropped, so the
/// bookkeeping happens on every exit path of a handler run. The key's timer is
/// then woken to pick up the new `next_at`.
struct InFlightGuard<'a> {
    inner: &'a SchedulerInner,
    key: &'a RefreshKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let now = self.inner.clock.now_ms();
        {
            let mut state = self.inner.lock_state();
            state.in_flight.release(self.key);
            let auto_enabled = state.auto_enabled;
            state.meta.mark_refreshed(self.key, now, auto_enabled);
        }
        if let Some(wakeup) = self.inner.wakeups.get(self.key) {
            wakeup.notify_one();
        }
    }
}

/// Holds the loading flag up for the lifetime of one `refresh_all` call.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Scheduler {
    /// Start building a scheduler with the system clock, no backoff source and
    /// auto-refresh enabled.
    pub fn builder(registry: KeyRegistry, handlers: HandlerTable) -> SchedulerBuilder {
        SchedulerBuilder {
            registry,
            handlers,
            clock: Arc::new(SystemClock),
            backoff: Arc::new(NoBackoff),
            auto_enabled: true,
        }
    }

    /// Arm the timers if auto-refresh is enabled.
    ///
    /// This establishes the `now + interval` baseline for every auto key. Must
    /// be called from within a Tokio runtime.
    pub fn start(&self) {
        let enabled = self.inner.lock_state().auto_enabled;
        info!(event = "core.scheduler.start_started", auto_enabled = enabled);
        if self.is_shut_down() {
            warn!(event = "core.scheduler.start_ignored_after_shutdown");
            return;
        }
        if enabled {
            self.arm_timers();
        }
    }

    /// Refresh one key.
    ///
    /// Resolves once the attempt has been accounted for: not registered,
    /// deferred by backoff, dropped because the key is already running, or run
    /// to completion. Handler errors and panics are logged here and never
    /// reach the caller.
    pub async fn trigger_refresh(&self, key: &RefreshKey, source: TriggerSource) -> TriggerOutcome {
        let Some(handler) = self.inner.handlers.get(key) else {
            debug!(
                event = "core.scheduler.refresh_unregistered",
                key = %key,
                source = %source,
            );
            return TriggerOutcome::Unregistered;
        };
        self.execute(key, source, handler).await
    }

    /// Refresh every key that has a handler, once, concurrently.
    ///
    /// Uses manual semantics, so the backoff gate is bypassed. One handler
    /// failing never stops the others.
    ///
    /// With `force_bridge`, the forced handler (if registered) runs *in place
    /// of* its key's regular handler rather than as an extra call next to it,
    /// so the bridge is hit once per refresh-all. It shares that key's
    /// in-flight slot and metadata.
    pub async fn refresh_all(&self, force_bridge: bool) -> RefreshAllSummary {
        let _loading = LoadingGuard::new(&self.inner.loading);

        info!(
            event = "core.scheduler.refresh_all_started",
            force_bridge = force_bridge,
        );

        let forced = if force_bridge {
            self.inner.handlers.forced()
        } else {
            None
        };

        let keys = self.inner.handlers.keys();
        let runs = keys.iter().map(|key| {
            let handler = match &forced {
                Some((forced_key, forced_handler)) if *forced_key == key => {
                    Some(forced_handler.clone())
                }
                _ => self.inner.handlers.get(key),
            };
            async move {
                match handler {
                    Some(handler) => self.execute(key, TriggerSource::Manual, handler).await,
                    None => TriggerOutcome::Unregistered,
                }
            }
        });
        let outcomes = futures::future::join_all(runs).await;

        let mut summary = RefreshAllSummary {
            forced: forced.is_some(),
            ..Default::default()
        };
        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(
            event = "core.scheduler.refresh_all_completed",
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            forced = summary.forced,
        );

        summary
    }

    /// Turn automatic refreshing on or off.
    ///
    /// Off cancels every timer immediately and leaves `next_at` values as they
    /// were. On gives every auto key a fresh `now + interval` baseline at the
    /// same instant and re-arms the timers. Must be called from within a Tokio
    /// runtime when enabling. Enabling after [`shutdown`](Self::shutdown) does
    /// nothing.
    pub fn set_auto_refresh(&self, enabled: bool) {
        if enabled {
            if self.is_shut_down() {
                warn!(event = "core.scheduler.auto_refresh_ignored_after_shutdown");
                return;
            }
            {
                let mut state = self.inner.lock_state();
                if state.auto_enabled && state.timers.is_some() {
                    return;
                }
                state.auto_enabled = true;
            }
            info!(event = "core.scheduler.auto_refresh_enabled");
            self.arm_timers();
        } else {
            let timers = {
                let mut state = self.inner.lock_state();
                state.auto_enabled = false;
                state.timers.take()
            };
            if let Some(token) = timers {
                token.cancel();
                info!(event = "core.scheduler.timers_cancelled");
            }
            info!(event = "core.scheduler.auto_refresh_disabled");
        }
    }

    /// Cancel all timers. Handlers already running are left to finish.
    pub fn shutdown(&self) {
        info!(event = "core.scheduler.shutdown_started");
        self.inner.shutdown.cancel();
        self.inner.lock_state().timers = None;
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.inner.lock_state().auto_enabled
    }

    /// The view's global loading flag: true while any `refresh_all` is outstanding.
    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst) > 0
    }

    pub fn is_in_flight(&self, key: &RefreshKey) -> bool {
        self.inner.lock_state().in_flight.contains(key)
    }

    pub fn meta(&self, key: &RefreshKey) -> Option<RefreshMeta> {
        self.inner.lock_state().meta.get(key).copied()
    }

    /// Every registered key with its metadata, in key order.
    pub fn snapshot(&self) -> Vec<KeyStatus> {
        let state = self.inner.lock_state();
        self.inner
            .registry
            .iter()
            .map(|(key, kind)| KeyStatus {
                key: key.clone(),
                kind,
                meta: state.meta.get(key).copied().unwrap_or_default(),
                in_flight: state.in_flight.contains(key),
                has_handler: self.inner.handlers.contains(key),
            })
            .collect()
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.inner.registry
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    async fn execute(&self, key: &RefreshKey, source: TriggerSource, handler: Handler) -> TriggerOutcome {
        let now = self.inner.clock.now_ms();
        {
            let mut state = self.inner.lock_state();

            let backoff_until = match source {
                TriggerSource::Auto => self.inner.backoff.backoff_until_ms(),
                TriggerSource::Manual => 0,
            };
            if let GateDecision::Defer { until_ms } = backoff::check_gate(source, now, backoff_until)
            {
                let next_at = state.meta.mark_deferred(key, now, until_ms).unwrap_or(until_ms);
                info!(
                    event = "core.scheduler.refresh_deferred",
                    key = %key,
                    backoff_until_ms = until_ms,
                    next_at = next_at,
                );
                return TriggerOutcome::Deferred { until_ms: next_at };
            }

            if !state.in_flight.try_acquire(key) {
                debug!(
                    event = "core.scheduler.refresh_skipped_in_flight",
                    key = %key,
                    source = %source,
                );
                return TriggerOutcome::AlreadyInFlight;
            }
        }

        let _guard = InFlightGuard {
            inner: &self.inner,
            key,
        };

        info!(
            event = "core.scheduler.refresh_started",
            key = %key,
            source = %source,
        );

        let result = AssertUnwindSafe(async move { handler().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(()) => {
                info!(
                    event = "core.scheduler.refresh_completed",
                    key = %key,
                    source = %source,
                );
                TriggerOutcome::Completed
            }
            Err(e) => {
                let panicked = matches!(e, HandlerError::Panicked(_));
                if panicked {
                    error!(
                        event = "core.scheduler.refresh_panicked",
                        key = %key,
                        source = %source,
                        error = %e,
                    );
                } else {
                    warn!(
                        event = "core.scheduler.refresh_failed",
                        key = %key,
                        source = %source,
                        error = %e,
                    );
                }
                TriggerOutcome::Failed
            }
        }
    }

    fn arm_timers(&self) {
        let token = self.inner.shutdown.child_token();
        let now = self.inner.clock.now_ms();
        let previous = {
            let mut state = self.inner.lock_state();
            state.meta.rebase_auto(now);
            state.timers.replace(token.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        let mut armed = 0;
        for (key, interval_ms) in self.inner.registry.auto_keys() {
            if !self.inner.handlers.contains(key) {
                continue;
            }
            let Some(wakeup) = self.inner.wakeups.get(key) else {
                continue;
            };
            tokio::spawn(timers::run_key_timer(
                Arc::downgrade(&self.inner),
                key.clone(),
                interval_ms,
                wakeup.clone(),
                token.clone(),
            ));
            armed += 1;
        }

        info!(event = "core.scheduler.timers_armed", timers = armed, baseline_ms = now);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("keys", &self.inner.registry.len())
            .field("handlers", &self.inner.handlers)
            .field("auto_enabled", &self.auto_refresh_enabled())
            .finish()
    }
}
