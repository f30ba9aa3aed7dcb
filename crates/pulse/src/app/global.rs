use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("pulse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keep many independently paced data sources fresh")
        .long_about("pulse drives a set of refresh keys from a TOML interval table. Each key is backed by a shell command; timed keys run on their own interval, manual keys only on request, and automatic refreshes back off while the backend asks callers to slow down.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Config file applied on top of ~/.pulse and ./.pulse")
                .value_name("PATH")
                .value_parser(clap::value_parser!(std::path::PathBuf))
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
