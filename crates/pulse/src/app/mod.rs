mod config;
mod global;
mod refresh;


use clap::Command;

pub fn build_cli() -> Command {
    global::root_command()
        .subcommand(refresh::keys_command())
        .subcommand(config::check_command())
        .subcommand(refresh::run_command())
}
