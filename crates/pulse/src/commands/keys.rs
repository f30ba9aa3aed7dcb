use clap::ArgMatches;
use serde::Serialize;
use tracing::info;

use pulse_core::{KeyKind, KeyRegistry, RefreshKey};

use super::helpers::load_config_with_warning;
use crate::table::{TableFormatter, format_kind, key_columns};

#[derive(Serialize)]
struct KeyEntry<'a> {
    key: &'a RefreshKey,
    #[serde(flatten)]
    kind: KeyKind,
    command: Option<&'a str>,
    force_command: Option<&'a str>,
}

pub(crate) fn handle_keys_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    info!(event = "cli.keys_started", json_output = json_output);

    let config = load_config_with_warning(matches);
    let registry = KeyRegistry::from_config(&config.refresh)?;

    let entries: Vec<KeyEntry> = registry
        .iter()
        .map(|(key, kind)| {
            let settings = config.handlers.get(key.as_str());
            KeyEntry {
                key,
                kind,
                command: settings.map(|s| s.command.as_str()),
                force_command: settings.and_then(|s| s.force_command.as_deref()),
            }
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No refresh keys configured.");
    } else {
        let rows = entries
            .iter()
            .map(|entry| {
                vec![
                    entry.key.to_string(),
                    format_kind(&entry.kind),
                    entry.command.unwrap_or("-").to_string(),
                ]
            })
            .collect();
        TableFormatter::new(&key_columns(), rows).print();
    }

    info!(event = "cli.keys_completed", count = entries.len());
    Ok(())
}
