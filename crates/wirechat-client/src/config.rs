//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/wirechat/config.toml` by default:
//!
//! ```toml
//! username = "alice"
//!
//! [server]
//! host = "chat.example.org"
//! port = 5050
//! timeout = 5
//!
//! [daemon]
//! host = "0.0.0.0"
//! port = 5050
//! idle_timeout = 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use wirechat_server::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig};

/// Configuration for the wirechat client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Username used by `chat` when none is given.
    pub username: Option<String>,

    /// Server to connect to.
    pub server: ServerSettings,

    /// Settings for `wirechat server`.
    pub daemon: DaemonSettings,
}

/// Server/connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host name or IP address of the server.
    pub host: String,

    /// TCP port of the server.
    pub port: u16,

    /// Connect and response timeout in seconds.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout: 5,
        }
    }
}

impl ServerSettings {
    /// Returns `host:port`.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Returns the timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Settings for running the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Address to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Seconds to wait for connections to finish on shutdown.
    pub shutdown_timeout: u64,

    /// Release connections idle for this many seconds.
    pub idle_timeout: Option<u64>,

    /// Largest accepted payload in bytes.
    pub max_payload_size: Option<u32>,

    /// Seconds a write to a client may block before the client is dropped.
    pub write_timeout: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: defaults.max_connections,
            shutdown_timeout: defaults.shutdown_timeout.as_secs(),
            idle_timeout: None,
            max_payload_size: None,
            write_timeout: defaults.write_timeout.as_secs(),
        }
    }
}

impl DaemonSettings {
    /// Converts to server configuration.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig::new(self.host.clone(), self.port)
            .with_max_connections(self.max_connections)
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout))
            .with_idle_timeout(self.idle_timeout.map(Duration::from_secs))
            .with_max_payload_size(self.max_payload_size)
            .with_write_timeout(Duration::from_secs(self.write_timeout))
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wirechat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert!(!config.debug);
        assert_eq!(config.username, None);
        assert_eq!(config.server.address(), "127.0.0.1:5050");
        assert_eq!(config.server.timeout(), Duration::from_secs(5));
        assert_eq!(config.daemon.host, "0.0.0.0");
        assert_eq!(config.daemon.max_connections, 100);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
username = "alice"

[server]
host = "chat.example.org"
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.server.address(), "chat.example.org:5050");
        assert_eq!(config.daemon, DaemonSettings::default());
    }

    #[test]
    fn daemon_settings_build_server_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[daemon]
host = "127.0.0.1"
port = 6000
max_connections = 8
shutdown_timeout = 3
idle_timeout = 60
max_payload_size = 4096
write_timeout = 2
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        let server = config.daemon.to_server_config();
        assert_eq!(server.address(), "127.0.0.1:6000");
        assert_eq!(server.max_connections, 8);
        assert_eq!(server.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(server.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(server.max_payload_size, Some(4096));
        assert_eq!(server.write_timeout, Duration::from_secs(2));
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();

        let err = ClientConfig::load_from(file.path()).unwrap_err();
        assert!(err.starts_with("failed to parse config"));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.starts_with("failed to read config"));
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let settings = ServerSettings {
            host: "::1".into(),
            ..Default::default()
        };
        assert_eq!(settings.address(), "[::1]:5050");
    }
}
