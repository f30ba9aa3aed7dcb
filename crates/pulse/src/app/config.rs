use clap::Command;

pub fn check_command() -> Command {
    Command::new("check").about("Load and validate the configuration hierarchy")
}
