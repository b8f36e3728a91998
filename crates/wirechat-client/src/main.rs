//! wirechat CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use wirechat_client::cli::{Cli, Command, ConfigAction, LogFormat};
use wirechat_client::commands;
use wirechat_client::config::ClientConfig;
use wirechat_client::error::{ClientError, ClientResult};
use wirechat_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The daemon logs like a server, everything else stays quiet
    let tracing_config = match cli.command {
        Command::Server { .. } => TracingConfig::server(),
        _ => TracingConfig::client(),
    }
    .with_debug(cli.debug || config.debug)
    .with_format(match cli.log_format {
        LogFormat::Compact => TracingOutputFormat::Compact,
        LogFormat::Pretty => TracingOutputFormat::Pretty,
        LogFormat::Json => TracingOutputFormat::Json,
    });
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config),
        None => ClientConfig::load().map_err(ClientError::Config),
    }
}

async fn run(cli: &Cli, config: &ClientConfig) -> ClientResult<()> {
    match &cli.command {
        Command::Server { .. } => {
            commands::server::run(commands::server::server_config(&cli.command, config)).await
        }
        Command::Create { username } => commands::account::create(cli, config, username).await,
        Command::Delete { username } => commands::account::delete(cli, config, username).await,
        Command::List { pattern } => commands::account::list(cli, config, pattern).await,
        Command::Send { from, to, text } => {
            commands::account::send(cli, config, from, to, &text.join(" ")).await
        }
        Command::Chat { username } => {
            commands::chat::run(cli, config, username.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
