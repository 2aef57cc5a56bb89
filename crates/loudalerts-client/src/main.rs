//! loudalerts CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use loudalerts_client::cli::{Cli, Command, ConfigAction};
use loudalerts_client::commands;
use loudalerts_client::config::ClientConfig;
use loudalerts_client::error::ClientResult;
use loudalerts_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = ClientConfig::resolve(cli.config.as_deref())?;

    let debug = cli.debug || config.debug;
    let tracing_config = match cli.command {
        Command::Run { .. } if !debug => TracingConfig::default(),
        _ => TracingConfig::for_cli(debug),
    };
    init_tracing(tracing_config)?;

    match cli.command {
        Command::Run { events, interval } => {
            let options = commands::run::RunOptions {
                events,
                interval,
                config_path: cli.config,
            };
            commands::run::run(&config, options).await
        }
        Command::TestAlert { wait } => commands::test_alert::run(&config, wait).await,
        Command::SnoozeOptions { minutes } => commands::snooze::print(minutes),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(cli.config.as_deref()),
        },
    }
}
