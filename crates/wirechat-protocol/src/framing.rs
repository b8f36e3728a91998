//! Fixed-header message framing.
//!
//! Every frame is a 6-byte big-endian header followed by a UTF-8 payload:
//!
//! ```text
//! +-------------+-----------------+---------------+------------------+
//! | version (1) | payload size (4)| operation (1) |  UTF-8 payload   |
//! +-------------+-----------------+---------------+------------------+
//! ```
//!
//! The size field always equals the payload's byte length, not its
//! character count.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{RequestCode, ResponseCode};
use crate::{HEADER_SIZE, PROTOCOL_VERSION};

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version of the sender.
    pub version: u8,
    /// Payload length in bytes.
    pub size: u32,
    /// Raw operation code.
    pub operation: u8,
}

impl Header {
    /// Serializes the header to its wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..5].copy_from_slice(&self.size.to_be_bytes());
        bytes[5] = self.operation;
        bytes
    }
}

/// Encodes a message into its header and payload bytes.
///
/// # Example
///
/// ```rust
/// use wirechat_protocol::{decode_header, encode, RequestCode};
///
/// let (header, payload) = encode(1, RequestCode::Login.as_u8(), "alice").unwrap();
/// assert_eq!(payload, b"alice");
/// assert_eq!(decode_header(&header).unwrap().size, 5);
/// ```
pub fn encode(
    version: u8,
    operation: u8,
    message: &str,
) -> ProtocolResult<([u8; HEADER_SIZE], Vec<u8>)> {
    let payload = message.as_bytes().to_vec();
    let size = u32::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX,
    })?;

    let header = Header {
        version,
        size,
        operation,
    };
    Ok((header.to_bytes(), payload))
}

/// Decodes a frame header.
///
/// Fails unless `bytes` is exactly [`HEADER_SIZE`] long. The version is
/// returned as-is; deciding whether it is acceptable is up to the caller.
pub fn decode_header(bytes: &[u8]) -> ProtocolResult<Header> {
    let bytes: [u8; HEADER_SIZE] =
        bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidHeaderLength {
                expected: HEADER_SIZE,
                received: bytes.len(),
            })?;

    Ok(Header {
        version: bytes[0],
        size: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        operation: bytes[5],
    })
}

/// One header + payload unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version.
    pub version: u8,
    /// Raw operation code.
    pub operation: u8,
    /// Payload text.
    pub payload: String,
}

impl Frame {
    /// Creates a frame with an explicit version and raw operation.
    pub fn new(version: u8, operation: u8, payload: impl Into<String>) -> Self {
        Self {
            version,
            operation,
            payload: payload.into(),
        }
    }

    /// Creates a request frame at the current protocol version.
    pub fn request(code: RequestCode, payload: impl Into<String>) -> Self {
        Self::new(PROTOCOL_VERSION, code.as_u8(), payload)
    }

    /// Creates a response frame at the current protocol version.
    pub fn response(code: ResponseCode, payload: impl Into<String>) -> Self {
        Self::new(PROTOCOL_VERSION, code.as_u8(), payload)
    }

    /// Interprets the operation as a request code.
    pub fn request_code(&self) -> Option<RequestCode> {
        RequestCode::try_from(self.operation).ok()
    }

    /// Interprets the operation as a response code.
    pub fn response_code(&self) -> Option<ResponseCode> {
        ResponseCode::try_from(self.operation).ok()
    }

    /// Encodes the whole frame, header followed by payload.
    pub fn to_bytes(&self) -> ProtocolResult<Vec<u8>> {
        let (header, payload) = encode(self.version, self.operation, &self.payload)?;
        let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
        buffer.extend_from_slice(&header);
        buffer.extend_from_slice(&payload);
        Ok(buffer)
    }
}

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_payload: Option<u32>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_payload: None,
        }
    }

    /// Rejects frames announcing more than `max` payload bytes.
    pub fn with_max_payload(mut self, max: Option<u32>) -> Self {
        self.max_payload = max;
        self
    }

    /// Reads the next header.
    ///
    /// Returns `Ok(None)` if the stream ended cleanly before any header byte.
    pub async fn read_header(&mut self) -> ProtocolResult<Option<Header>> {
        let mut buf = [0u8; HEADER_SIZE];
        let filled = fill(&mut self.reader, &mut buf).await?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < HEADER_SIZE {
            return Err(ProtocolError::IncompleteFrame {
                expected: HEADER_SIZE,
                received: filled,
            });
        }

        let header = decode_header(&buf)?;
        if let Some(max) = self.max_payload
            && header.size > max
        {
            return Err(ProtocolError::PayloadTooLarge {
                size: header.size as usize,
                max,
            });
        }
        Ok(Some(header))
    }

    /// Reads exactly `header.size` payload bytes and decodes them as UTF-8.
    ///
    /// The buffer grows as bytes arrive, so a header announcing a large size
    /// costs nothing until the payload is actually sent.
    pub async fn read_payload(&mut self, header: &Header) -> ProtocolResult<String> {
        let len = header.size as usize;
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(u64::from(header.size))
            .read_to_end(&mut payload)
            .await?;
        if payload.len() < len {
            return Err(ProtocolError::IncompleteFrame {
                expected: len,
                received: payload.len(),
            });
        }
        Ok(String::from_utf8(payload)?)
    }

    /// Reads a single frame.
    ///
    /// Returns `Ok(None)` if the stream is empty (EOF before any bytes).
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let Some(header) = self.read_header().await? else {
            return Ok(None);
        };
        let payload = self.read_payload(&header).await?;
        Ok(Some(Frame::new(header.version, header.operation, payload)))
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single frame and flushes it.
    pub async fn write_frame(&mut self, frame: &Frame) -> ProtocolResult<()> {
        let data = frame.to_bytes()?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
