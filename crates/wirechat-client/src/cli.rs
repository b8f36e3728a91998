//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// wirechat - a small multi-user chat over TCP
#[derive(Debug, Parser)]
#[command(name = "wirechat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "WIRECHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    // --- Connection flags ---
    /// Server host to connect to
    #[arg(long, env = "WIRECHAT_HOST")]
    pub host: Option<String>,

    /// Server port to connect to
    #[arg(long, short, env = "WIRECHAT_PORT")]
    pub port: Option<u16>,

    /// Connection timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Single-line logs
    Compact,
    /// Multi-line logs
    Pretty,
    /// JSON lines
    Json,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the chat server in the foreground
    Server {
        /// Address to bind
        #[arg(long, value_name = "HOST")]
        bind: Option<String>,

        /// Port to bind
        #[arg(long, value_name = "PORT")]
        listen_port: Option<u16>,

        /// Maximum concurrent connections
        #[arg(long)]
        max_connections: Option<usize>,

        /// Release connections idle for this many seconds
        #[arg(long, value_name = "SECONDS")]
        idle_timeout: Option<u64>,
    },

    /// Create an account
    Create {
        /// Username to register
        username: String,
    },

    /// Delete an account
    Delete {
        /// Username to delete
        username: String,
    },

    /// List accounts matching a shell-style pattern
    List {
        /// Pattern such as `j*` or `user[0-9]`
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Send a single message
    Send {
        /// Sender username
        from: String,

        /// Receiver username
        to: String,

        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Log in and chat interactively
    Chat {
        /// Username to log in as (defaults to the configured one)
        username: Option<String>,
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

    /// Show configuration file path
    Path,
}
