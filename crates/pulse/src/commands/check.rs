use clap::ArgMatches;
use tracing::info;

use pulse_core::KeyRegistry;

use super::helpers::load_config_or_report;
use crate::color;

pub(crate) fn handle_check_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    info!(event = "cli.check_started");

    let config = load_config_or_report(matches)?;
    let registry = KeyRegistry::from_config(&config.refresh)?;

    let auto = registry.auto_keys().count();
    let manual = registry.manual_keys().count();
    let unbacked: Vec<String> = registry
        .iter()
        .map(|(key, _)| key.to_string())
        .filter(|key| !config.handlers.contains_key(key))
        .collect();

    println!("{}", color::fresh("Configuration is valid."));
    println!(
        "  {} auto keys, {} manual keys, {} handlers",
        auto,
        manual,
        config.handlers.len()
    );
    println!(
        "  auto-refresh starts {}",
        if config.refresh.auto_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  backoff: exit code {} pauses automatic refresh for {}s",
        config.backoff.exit_code(),
        config.backoff.default_secs()
    );
    if !unbacked.is_empty() {
        println!(
            "  {} {}",
            color::muted("no handler (never refreshed):"),
            unbacked.join(", ")
        );
    }

    info!(
        event = "cli.check_completed",
        auto_keys = auto,
        manual_keys = manual,
        handlers = config.handlers.len(),
    );
    Ok(())
}
