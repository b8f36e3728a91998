//! Server configuration.

use std::time::Duration;

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 5050;

/// Address the server binds to unless told otherwise (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host or IP address to bind.
    pub host: String,

    /// TCP port to bind.
    pub port: u16,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// How long shutdown waits for connection tasks to finish.
    pub shutdown_timeout: Duration,

    /// Release connections that send no complete request for this long.
    pub idle_timeout: Option<Duration>,

    /// Reject frames announcing a larger payload.
    pub max_payload_size: Option<u32>,

    /// Longest a single frame write may block on a peer that stops reading.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
            shutdown_timeout: Duration::from_secs(1),
            idle_timeout: None,
            max_payload_size: None,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration for the given host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Returns `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Builder: set idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builder: set max payload size.
    pub fn with_max_payload_size(mut self, max: Option<u32>) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Builder: set write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}
