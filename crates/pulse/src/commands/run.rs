use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::ArgMatches;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pulse_core::staleness::{self, StalenessReport};
use pulse_core::{
    BackoffWindow, Clock, KeyRegistry, KeyStatus, PulseConfig, RefreshKey, Scheduler,
    SystemClock, TriggerSource, events,
};

use super::helpers::load_config_or_report;
use super::shutdown;
use crate::color;
use crate::panels::{CommandRunner, PanelBoard, PanelState, build_handlers};
use crate::table::{TableFormatter, status_columns, status_row};

#[derive(Debug, Clone, Copy)]
struct RunOptions {
    no_auto: bool,
    once: bool,
    force_bridge: bool,
    status_every: Option<Duration>,
    duration: Option<Duration>,
    json: bool,
}

impl RunOptions {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            no_auto: matches.get_flag("no-auto"),
            once: matches.get_flag("once"),
            force_bridge: matches.get_flag("force-bridge"),
            status_every: matches
                .get_one::<u64>("status-every")
                .copied()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            duration: matches
                .get_one::<u64>("duration")
                .copied()
                .map(Duration::from_secs),
            json: matches.get_flag("json"),
        }
    }
}

/// One line of `--json` status output.
#[derive(Serialize)]
struct StatusSnapshot<'a> {
    at: String,
    auto_refresh: bool,
    loading: bool,
    staleness: &'a StalenessReport,
    keys: &'a [KeyStatus],
    panels: BTreeMap<String, PanelState>,
}

/// What a line typed on stdin asks for while running.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    RefreshAll { force_bridge: bool },
    ToggleAuto,
    Status,
    Refresh(RefreshKey),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "r" | "refresh" => Some(Self::RefreshAll {
                force_bridge: false,
            }),
            "f" | "force" => Some(Self::RefreshAll { force_bridge: true }),
            "a" | "auto" => Some(Self::ToggleAuto),
            "s" | "status" => Some(Self::Status),
            key => Some(Self::Refresh(RefreshKey::from(key))),
        }
    }
}

pub(crate) fn handle_run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let options = RunOptions::from_matches(matches);

    info!(
        event = "cli.run_started",
        no_auto = options.no_auto,
        once = options.once,
        force_bridge = options.force_bridge,
    );

    let config = load_config_or_report(matches)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run_dashboard(config, options)) {
        Ok(()) => {
            info!(event = "cli.run_completed");
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", color::error("Run failed:"), e);
            error!(event = "cli.run_failed", error = %e);
            events::log_app_error(&*e);
            Err(e)
        }
    }
}

async fn run_dashboard(
    config: PulseConfig,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = KeyRegistry::from_config(&config.refresh)?;
    let window = Arc::new(BackoffWindow::new());
    let board = Arc::new(PanelBoard::new());
    let runner = Arc::new(CommandRunner::new(
        &config,
        board.clone(),
        window.clone(),
        clock.clone(),
    ));
    let handlers = build_handlers(&config, runner);

    if handlers.is_empty() {
        eprintln!(
            "{}",
            color::warning("No [handlers] configured; nothing will be refreshed.")
        );
    }

    let scheduler = Scheduler::builder(registry, handlers)
        .clock(clock)
        .backoff(window)
        .auto_enabled(config.refresh.auto_enabled() && !options.no_auto)
        .build()?;

    if options.once {
        return run_once(&scheduler, &board, options).await;
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown::wait_for_shutdown_signal(signal_token).await {
            error!(
                event = "cli.run.signal_handler_failed",
                error = %e,
            );
        }
    });

    scheduler.start();

    // Initial load, as a view does when it first mounts.
    tokio::select! {
        _ = shutdown_token.cancelled() => {}
        summary = scheduler.refresh_all(options.force_bridge) => {
            info!(
                event = "cli.run.initial_refresh_completed",
                completed = summary.completed,
                failed = summary.failed,
            );
        }
    }
    print_status(&scheduler, &board, options.json);

    let mut status_ticker = options.status_every.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let deadline = sleep_or_forever(options.duration);
    tokio::pin!(deadline);

    let mut stdin = Some(BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            _ = &mut deadline => {
                info!(event = "cli.run.duration_elapsed");
                break;
            }
            _ = next_tick(&mut status_ticker) => {
                print_status(&scheduler, &board, options.json);
            }
            line = next_line(&mut stdin) => match line {
                Some(line) => {
                    if let Some(command) = ConsoleCommand::parse(&line) {
                        dispatch(&scheduler, &board, command, options.json);
                    }
                }
                None => stdin = None,
            },
        }
    }

    events::log_app_shutdown();
    scheduler.shutdown();
    print_status(&scheduler, &board, options.json);
    Ok(())
}

async fn run_once(
    scheduler: &Scheduler,
    board: &PanelBoard,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = scheduler.refresh_all(options.force_bridge).await;
    print_status(scheduler, board, options.json);

    let panel_errors = scheduler
        .snapshot()
        .iter()
        .filter(|status| {
            board
                .get(status.key.as_str())
                .is_some_and(|panel| panel.last_error.is_some())
        })
        .count();

    info!(
        event = "cli.run.once_completed",
        completed = summary.completed,
        failed = summary.failed,
        panel_errors = panel_errors,
    );

    if summary.failed > 0 || panel_errors > 0 {
        return Err(format!(
            "{} handler(s) failed, {} panel(s) reported errors",
            summary.failed, panel_errors
        )
        .into());
    }
    Ok(())
}

fn dispatch(scheduler: &Scheduler, board: &Arc<PanelBoard>, command: ConsoleCommand, json: bool) {
    info!(event = "cli.run.console_command", command = ?command);

    match command {
        ConsoleCommand::RefreshAll { force_bridge } => {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler.refresh_all(force_bridge).await;
            });
        }
        ConsoleCommand::ToggleAuto => {
            let enabled = !scheduler.auto_refresh_enabled();
            scheduler.set_auto_refresh(enabled);
            println!(
                "auto-refresh {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        ConsoleCommand::Status => print_status(scheduler, board, json),
        ConsoleCommand::Refresh(key) => {
            if !scheduler.registry().contains(&key) {
                warn!(event = "cli.run.unknown_key", key = %key);
                eprintln!("{}", color::warning(&format!("Unknown key '{}'", key)));
                return;
            }
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler.trigger_refresh(&key, TriggerSource::Manual).await;
            });
        }
    }
}

fn print_status(scheduler: &Scheduler, board: &PanelBoard, json: bool) {
    let now_ms = scheduler.now_ms();
    let keys = scheduler.snapshot();
    let report = staleness::evaluate(&board.staleness_inputs(), now_ms);

    if json {
        let snapshot = StatusSnapshot {
            at: chrono::Utc::now().to_rfc3339(),
            auto_refresh: scheduler.auto_refresh_enabled(),
            loading: scheduler.is_loading(),
            staleness: &report,
            keys: &keys,
            panels: board.snapshot(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(event = "cli.run.status_serialize_failed", error = %e),
        }
        return;
    }

    let rows = keys
        .iter()
        .map(|status| status_row(status, board.get(status.key.as_str()).as_ref(), now_ms))
        .collect();
    TableFormatter::new(&status_columns(), rows).print();

    let heartbeat = report
        .heartbeat_age_secs
        .map_or("no heartbeat".to_string(), |secs| {
            format!("heartbeat {}s ago", secs)
        });
    let mut line = format!(
        "{} {} {} auto-refresh {}",
        color::bold("Data:"),
        color::staleness(&report.status.to_string()),
        color::muted(&format!("({})", heartbeat)),
        if scheduler.auto_refresh_enabled() {
            "on"
        } else {
            "off"
        },
    );
    if scheduler.is_loading() {
        line.push_str(&color::pending(" (refreshing)"));
    }
    println!("{}", line);
    if !report.reasons.is_empty() {
        println!("  {}", color::muted(&report.summary()));
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Next stdin line. `None` once stdin is closed or unreadable; pends forever
/// after that.
async fn next_line<R>(lines: &mut Option<tokio::io::Lines<R>>) -> Option<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!(event = "cli.run.stdin_read_failed", error = %e);
                None
            }
        },
        None => std::future::pending().await,
    }
}
