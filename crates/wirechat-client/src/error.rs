//! Client error types.

use std::fmt;

use wirechat_protocol::ProtocolError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to server failed.
    Connection(String),
    /// Protocol/framing error.
    Protocol(String),
    /// Request timed out.
    Timeout(String),
    /// Server answered with FAILURE.
    Refused(String),
    /// Server closed the session.
    Disconnected(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Refused(msg) => write!(f, "{}", msg),
            Self::Disconnected(msg) => write!(f, "disconnected: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(err) => Self::Io(err),
            other => Self::Protocol(other.to_string()),
        }
    }
}
