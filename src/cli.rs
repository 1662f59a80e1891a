use clap::{Arg, ArgAction, ArgMatches, Command};
use std::env;
use std::path::PathBuf;

pub struct CliArgs {
    pub config_path: PathBuf,
    pub states_path: PathBuf,
    pub interval: Option<u64>,
    pub check: bool,
    pub update: Option<(String, String)>,
    pub json: bool,
}

impl From<ArgMatches> for CliArgs {
    fn from(matches: ArgMatches) -> Self {
        let update = matches
            .get_one::<String>("update")
            .cloned()
            .zip(matches.get_one::<String>("trigger").cloned());
        CliArgs {
            config_path: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("wud-bridge.toml")),
            states_path: matches
                .get_one::<PathBuf>("states")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("states.json")),
            interval: matches.get_one::<u64>("watch").copied(),
            check: matches.get_flag("check"),
            update,
            json: matches.get_flag("json"),
        }
    }
}

pub(crate) fn command() -> Command {
    let default_watch_interval = env::var("WATCH_INTERVAL").unwrap_or_else(|_| "60".to_string());
    Command::new("wud-bridge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("show and trigger container updates known to What's Up Docker")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file")
                .value_name("PATH")
                .default_value("wud-bridge.toml")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("states")
                .short('s')
                .long("states")
                .help("JSON file with the host entity states, re-read on every run")
                .value_name("PATH")
                .default_value("states.json")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("watch")
                .short('w')
                .long("watch")
                .help(format!(
                    "Watch mode: re-run every N seconds (default: {default_watch_interval})"
                ))
                .value_name("SECONDS")
                .num_args(0..=1)
                .default_missing_value(default_watch_interval)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Ask WUD to check all containers for updates first")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("update")
                .long("update")
                .help("Update the container behind this entity")
                .value_name("ENTITY_ID")
                .requires("trigger"),
        )
        .arg(
            Arg::new("trigger")
                .long("trigger")
                .help("Trigger id used by --update")
                .value_name("TRIGGER_ID")
                .requires("update"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the view as JSON instead of logging it")
                .action(ArgAction::SetTrue),
        )
}

pub(crate) fn configure_cli() -> CliArgs {
    command().get_matches().into()
}
