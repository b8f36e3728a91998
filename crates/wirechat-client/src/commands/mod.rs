//! Subcommand implementations.

pub mod account;
pub mod chat;
pub mod config;
pub mod server;

use crate::cli::Cli;
use crate::config::{ClientConfig, ServerSettings};
use crate::error::ClientResult;
use crate::socket::ChatClient;

/// Merges command-line overrides into the configured server settings.
pub fn server_settings(cli: &Cli, config: &ClientConfig) -> ServerSettings {
    let mut settings = config.server.clone();
    if let Some(ref host) = cli.host {
        settings.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(timeout) = cli.timeout {
        settings.timeout = timeout;
    }
    settings
}

/// Connects to the server selected by `cli` and `config`.
pub async fn connect(cli: &Cli, config: &ClientConfig) -> ClientResult<ChatClient> {
    let settings = server_settings(cli, config);
    ChatClient::connect(&settings.address(), settings.timeout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_overrides_config() {
        let config = ClientConfig::default();
        let cli = Cli::parse_from(["wirechat", "--host", "10.0.0.2", "--timeout", "9", "list"]);

        let settings = server_settings(&cli, &config);
        assert_eq!(settings.address(), "10.0.0.2:5050");
        assert_eq!(settings.timeout, 9);
    }

    #[test]
    fn config_used_without_overrides() {
        let mut config = ClientConfig::default();
        config.server.port = 7000;
        let cli = Cli::parse_from(["wirechat", "list"]);

        assert_eq!(server_settings(&cli, &config).address(), "127.0.0.1:7000");
    }
}
