//! Server command: runs the chat daemon in the foreground.
//!
//! Wires together the signal handler, the shared state and the TCP server,
//! then blocks until SIGINT/SIGTERM.

use std::time::Duration;

use tracing::info;

use wirechat_server::{
    ChatServer, ServerConfig, SignalHandler, make_connection_handler, new_shared_state,
};

use crate::cli::Command;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Builds the server configuration from `config.toml` and command-line
/// overrides.
pub fn server_config(command: &Command, config: &ClientConfig) -> ServerConfig {
    let mut server = config.daemon.to_server_config();
    if let Command::Server {
        bind,
        listen_port,
        max_connections,
        idle_timeout,
    } = command
    {
        if let Some(host) = bind {
            server.host = host.clone();
        }
        if let Some(port) = listen_port {
            server.port = *port;
        }
        if let Some(max) = max_connections {
            server = server.with_max_connections(*max);
        }
        if let Some(secs) = idle_timeout {
            server = server.with_idle_timeout(Some(Duration::from_secs(*secs)));
        }
    }
    server
}

/// Starts the server and blocks until a shutdown signal is received.
pub async fn run(server_config: ServerConfig) -> ClientResult<()> {
    let signal_handler = SignalHandler::new();
    signal_handler
        .spawn_listener()
        .map_err(|e| ClientError::Config(format!("failed to install signal handlers: {}", e)))?;

    let state = new_shared_state();
    let server = ChatServer::bind(server_config, state.clone())
        .await
        .map_err(|e| ClientError::Connection(format!("failed to start server: {}", e)))?;

    let handler = make_connection_handler(state);
    let shutdown = signal_handler.shutdown();

    server
        .run_until_shutdown(handler, shutdown.wait())
        .await
        .map_err(|e| ClientError::Connection(format!("server error: {}", e)))?;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn flags_override_daemon_settings() {
        let mut config = ClientConfig::default();
        config.daemon.port = 6000;
        config.daemon.idle_timeout = Some(30);

        let cli = Cli::parse_from([
            "wirechat",
            "server",
            "--bind",
            "127.0.0.1",
            "--max-connections",
            "4",
        ]);
        let server = server_config(&cli.command, &config);

        assert_eq!(server.address(), "127.0.0.1:6000");
        assert_eq!(server.max_connections, 4);
        assert_eq!(server.idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::parse_from(["wirechat", "server", "--listen-port", "7777"]);
        let server = server_config(&cli.command, &ClientConfig::default());

        assert_eq!(server.address(), "0.0.0.0:7777");
        assert_eq!(server.idle_timeout, None);
        assert_eq!(server.max_payload_size, None);
    }
}
