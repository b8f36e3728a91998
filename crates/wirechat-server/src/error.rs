//! Server error types.
//!
//! [`ServerError`] covers failures of the server itself and of individual
//! connections. [`ChatError`] covers refused requests; its `Display` text is
//! exactly what the client receives in the FAILURE payload.

use std::io;
use std::time::Duration;

use thiserror::Error;
use wirechat_core::GlobError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for account and session operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, signal handler, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] wirechat_protocol::ProtocolError),

    /// Could not bind the listening socket.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Connection sent no complete request in time.
    #[error("Connection idle for {0:?}")]
    IdleTimeout(Duration),

    /// Shutdown requested.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    /// Creates a bind error.
    pub fn bind(address: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Returns true if the error means the peer is simply gone.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_connection_lost(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            Self::IdleTimeout(_) => true,
            _ => false,
        }
    }
}

/// A request the server understood but refused.
#[derive(Debug, Error)]
pub enum ChatError {
    /// CREATE_ACCOUNT for a username that is taken.
    #[error("Username already exists")]
    DuplicateAccount { username: String },

    /// CREATE_ACCOUNT with an empty username.
    #[error("Username must not be empty")]
    EmptyUsername,

    /// DELETE_ACCOUNT for an account with a live session.
    #[error("Account is logged in right now")]
    AccountLoggedIn { username: String },

    /// DELETE_ACCOUNT for an unknown username.
    #[error("Account not found")]
    AccountNotFound { username: String },

    /// LOGIN for an unknown username.
    #[error("Username does not exist")]
    UnknownAccount { username: String },

    /// LOGIN for an account that already has a session.
    #[error("User already logged in")]
    AlreadyLoggedIn { username: String },

    /// SEND_MESSAGE to an unknown username.
    #[error("Receiver not found.")]
    ReceiverNotFound { username: String },

    /// VIEW_MESSAGES from a connection that is not logged in.
    #[error("Server thinks user does not exist.")]
    NotLoggedIn,

    /// LIST_ACCOUNTS matched nothing.
    #[error("No matching accounts found.")]
    NoMatchingAccounts,

    /// LIST_ACCOUNTS with a pattern that does not compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] GlobError),

    /// SEND_MESSAGE payload without sender, receiver and text.
    #[error("Malformed message request")]
    MalformedMessage,
}
