//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// loudalerts - Calendar alerts you cannot miss
#[derive(Debug, Parser)]
#[command(name = "loudalerts")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "LOUDALERTS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the alert daemon in the foreground
    Run {
        /// JSON file listing calendar events, re-read on every poll
        #[arg(long, short, env = "LOUDALERTS_EVENTS")]
        events: PathBuf,

        /// Override the poll interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show a demo alert right away
    TestAlert {
        /// Seconds to wait for a snooze click before exiting
        #[arg(long, default_value = "90")]
        wait: u64,
    },

    /// List the snooze choices offered for an event starting in N minutes
    SnoozeOptions {
        /// Minutes until the event starts
        #[arg(long, short, allow_negative_numbers = true)]
        minutes: i64,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run() {
        let cli = Cli::parse_from(["loudalerts", "--debug", "run", "--events", "/tmp/e.json"]);
        assert!(cli.debug);
        match cli.command {
            Command::Run { events, interval } => {
                assert_eq!(events, PathBuf::from("/tmp/e.json"));
                assert_eq!(interval, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_negative_minutes() {
        let cli = Cli::parse_from(["loudalerts", "snooze-options", "--minutes", "-3"]);
        assert!(matches!(cli.command, Command::SnoozeOptions { minutes: -3 }));
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::parse_from(["loudalerts", "config", "path", "--config", "/etc/la.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/la.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }
}
