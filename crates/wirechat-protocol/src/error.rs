//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
///
/// Every variant is fatal for the connection it occurred on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header slice was not exactly [`HEADER_SIZE`](crate::HEADER_SIZE) bytes.
    #[error("invalid header length: expected {expected} bytes, got {received}")]
    InvalidHeaderLength { expected: usize, received: usize },

    /// Stream ended part-way through a frame.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// Payload is wider than the size field or the configured limit.
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: u32 },

    /// Payload bytes were not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Frame carried a version this peer does not speak.
    #[error("unsupported protocol version: {version} (expected {expected})")]
    UnsupportedVersion { version: u8, expected: u8 },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the peer went away rather than sending bad data.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::IncompleteFrame { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
