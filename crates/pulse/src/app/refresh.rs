use clap::{Arg, ArgAction, Command};

pub fn keys_command() -> Command {
    Command::new("keys")
        .about("List refresh keys with their kind and interval")
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue),
        )
}

pub fn run_command() -> Command {
    Command::new("run")
        .about("Run the refresh scheduler in the foreground")
        .arg(
            Arg::new("no-auto")
                .long("no-auto")
                .help("Start with automatic refreshing disabled")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Refresh every key once, print the result and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force-bridge")
                .long("force-bridge")
                .help("Use the forced bridge status command for the initial refresh")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("status-every")
                .long("status-every")
                .help("Print the status table every N seconds (0 disables)")
                .value_name("SECS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .help("Stop after N seconds instead of waiting for Ctrl-C")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print status snapshots as JSON lines")
                .action(ArgAction::SetTrue),
        )
}
