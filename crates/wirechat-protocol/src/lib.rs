//! Wire framing and operation codes for wirechat.
//!
//! # Protocol Overview
//!
//! Client and server exchange frames over TCP:
//! - 1 byte: protocol version
//! - 4 bytes: payload size (u32, big-endian)
//! - 1 byte: operation code ([`RequestCode`] or [`ResponseCode`])
//! - N bytes: UTF-8 payload
//!
//! Responses carry their status only in the operation byte; the payload is
//! free-form text. SEND_MESSAGE payloads hold `sender\nreceiver\ntext`.
//!
//! # Example
//!
//! ```rust
//! use wirechat_protocol::{decode_header, Frame, RequestCode};
//!
//! let frame = Frame::request(RequestCode::CreateAccount, "alice");
//! let bytes = frame.to_bytes().unwrap();
//! let header = decode_header(&bytes[..6]).unwrap();
//! assert_eq!(header.size, 5);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{Frame, FrameReader, FrameWriter, Header, decode_header, encode};
pub use types::{RequestCode, ResponseCode};

/// Protocol version constant.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 1 + 4 + 1;
