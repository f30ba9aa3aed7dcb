//! Command-backed refresh handlers and the panel state they write into.
//!
//! Each configured key runs its shell command through `sh -c`. A command that
//! exits non-zero is an ordinary handler failure: it is recorded as that
//! panel's error and the handler still returns `Ok`. Only a command that cannot
//! be started at all is reported to the scheduler as an `Err`.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use pulse_config::PulseConfig;
use pulse_core::{
    BackoffWindow, BridgeStatus, Clock, HandlerError, HandlerResult, HandlerTable, StalenessInputs,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

pub const BRIDGE_STATUS_KEY: &str = "bridge_status";
pub const ACCOUNT_SUMMARY_KEY: &str = "account_summary";
pub const POSITIONS_KEY: &str = "positions";
pub const CONNECTION_KEY: &str = "connection";

/// What one panel last received.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PanelState {
    pub payload: Option<Value>,
    pub last_error: Option<String>,
    pub runs: u64,
}

/// Page state shared by every handler. Successful data is kept when a later
/// refresh fails; only the error field changes.
#[derive(Debug, Default)]
pub struct PanelBoard {
    panels: Mutex<BTreeMap<String, PanelState>>,
}

impl PanelBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PanelState>> {
        match self.panels.lock() {
            Ok(panels) => panels,
            Err(poisoned) => {
                error!(event = "cli.panels.lock_poisoned");
                poisoned.into_inner()
            }
        }
    }

    pub fn record_success(&self, key: &str, payload: Option<Value>) {
        let mut panels = self.lock();
        let panel = panels.entry(key.to_string()).or_default();
        panel.runs += 1;
        panel.last_error = None;
        if payload.is_some() {
            panel.payload = payload;
        }
    }

    pub fn record_error(&self, key: &str, message: impl Into<String>) {
        let mut panels = self.lock();
        let panel = panels.entry(key.to_string()).or_default();
        panel.runs += 1;
        panel.last_error = Some(message.into());
    }

    pub fn get(&self, key: &str) -> Option<PanelState> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, PanelState> {
        self.lock().clone()
    }

    /// Pull the staleness signals out of the bridge, account, positions and
    /// connection panels.
    pub fn staleness_inputs(&self) -> StalenessInputs {
        let panels = self.lock();
        let payload = |key: &str| panels.get(key).and_then(|p| p.payload.as_ref());
        let stale_flag = |key: &str| {
            payload(key)
                .and_then(|v| v.get("stale"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        StalenessInputs {
            bridge: payload(BRIDGE_STATUS_KEY)
                .and_then(|v| serde_json::from_value::<BridgeStatus>(v.clone()).ok()),
            account_stale: stale_flag(ACCOUNT_SUMMARY_KEY),
            positions_stale: stale_flag(POSITIONS_KEY),
            stream_status: payload(CONNECTION_KEY)
                .and_then(|v| v.get("stream_status"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Runs handler commands and routes their results.
pub struct CommandRunner {
    board: Arc<PanelBoard>,
    backoff: Arc<BackoffWindow>,
    clock: Arc<dyn Clock>,
    backoff_exit_code: i32,
    backoff_window: Duration,
}

impl CommandRunner {
    pub fn new(
        config: &PulseConfig,
        board: Arc<PanelBoard>,
        backoff: Arc<BackoffWindow>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            board,
            backoff,
            clock,
            backoff_exit_code: config.backoff.exit_code(),
            backoff_window: Duration::from_secs(config.backoff.default_secs()),
        }
    }

    pub async fn run(&self, key: &str, command: &str) -> HandlerResult {
        debug!(event = "cli.handler.command_started", key = key, command = command);

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HandlerError::Other(Box::new(e)))?;

        match output.status.code() {
            Some(0) => {
                self.board
                    .record_success(key, parse_payload(&output.stdout));
            }
            Some(code) if code == self.backoff_exit_code => {
                let until_ms = self
                    .backoff
                    .note_rate_limited(self.clock.now_ms(), self.backoff_window);
                warn!(
                    event = "cli.handler.rate_limited",
                    key = key,
                    backoff_until_ms = until_ms,
                );
                self.board.record_error(
                    key,
                    format!(
                        "rate limited, automatic refresh paused for {}s",
                        self.backoff_window.as_secs()
                    ),
                );
            }
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = stderr.trim();
                let status = code.map_or("signal".to_string(), |c| format!("exit {}", c));
                warn!(
                    event = "cli.handler.command_failed",
                    key = key,
                    status = %status,
                    stderr = detail,
                );
                let message = if detail.is_empty() {
                    status
                } else {
                    format!("{}: {}", status, detail)
                };
                self.board.record_error(key, message);
            }
        }
        Ok(())
    }
}

/// JSON when the output parses, otherwise the trimmed text. Empty output
/// carries no payload.
fn parse_payload(stdout: &[u8]) -> Option<Value> {
    if let Ok(value) = serde_json::from_slice::<Value>(stdout) {
        return Some(value);
    }
    let text = String::from_utf8_lossy(stdout).trim().to_string();
    (!text.is_empty()).then_some(Value::String(text))
}

/// One handler per `[handlers.<key>]` section, plus the forced bridge variant.
pub fn build_handlers(config: &PulseConfig, runner: Arc<CommandRunner>) -> HandlerTable {
    let mut table = HandlerTable::new();

    for (key, settings) in &config.handlers {
        table.register(key.as_str(), command_handler(&runner, key, &settings.command));

        if let Some(force_command) = &settings.force_command {
            if key == BRIDGE_STATUS_KEY {
                table.register_forced(key.as_str(), command_handler(&runner, key, force_command));
            } else {
                warn!(
                    event = "cli.handler.force_command_ignored",
                    key = key.as_str(),
                );
            }
        }
    }

    table
}

fn command_handler(
    runner: &Arc<CommandRunner>,
    key: &str,
    command: &str,
) -> impl Fn() -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static {
    let runner = runner.clone();
    let key = key.to_string();
    let command = command.to_string();
    move || {
        let runner = runner.clone();
        let key = key.clone();
        let command = command.clone();
        async move { runner.run(&key, &command).await }.boxed()
    }
}
