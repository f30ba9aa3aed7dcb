use clap::ArgMatches;
use tracing::error;

use pulse_core::events;

mod check;
mod helpers;
mod keys;
mod run;
mod shutdown;

use check::handle_check_command;
use keys::handle_keys_command;
use run::handle_run_command;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    events::log_app_startup();

    match matches.subcommand() {
        Some(("keys", sub_matches)) => handle_keys_command(sub_matches),
        Some(("check", sub_matches)) => handle_check_command(sub_matches),
        Some(("run", sub_matches)) => handle_run_command(sub_matches),
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    }
}
