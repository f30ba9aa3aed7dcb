//! pulse-core: multi-resource refresh orchestration
//!
//! Keeps many independently paced data sources fresh without redundant
//! requests. Coordinates manual "refresh all" actions, respects backend
//! backoff windows and exposes last/next refresh metadata to a view.
//!
//! # Main Entry Points
//!
//! - [`scheduler`] - Timers, triggers and the auto-refresh toggle
//! - [`keys`] - Which resources exist and how they are paced
//! - [`handlers`] - The fetch-and-apply operation behind each key
//! - [`staleness`] - Read-side ok / stale / unknown projection

pub mod backoff;
pub mod clock;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod inflight;
pub mod keys;
pub mod logging;
pub mod meta;
pub mod scheduler;
pub mod staleness;

pub use backoff::{BackoffSource, BackoffWindow, GateDecision, NoBackoff};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{PulseError, PulseResult};
pub use handlers::{Handler, HandlerError, HandlerFuture, HandlerResult, HandlerTable};
pub use inflight::InFlightSet;
pub use keys::{KeyKind, KeyRegistry, RefreshKey, RegistryError};
pub use meta::{MetaStore, RefreshMeta};
pub use scheduler::{
    KeyStatus, RefreshAllSummary, Scheduler, SchedulerBuilder, TriggerOutcome, TriggerSource,
};
pub use staleness::{BridgeStatus, StaleReason, Staleness, StalenessInputs, StalenessReport};

// Re-export config types from pulse-config
pub use pulse_config::{ConfigError, PulseConfig};

// Re-export logging initialization
pub use logging::init_logging;
