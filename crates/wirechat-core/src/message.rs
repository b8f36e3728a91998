//! Chat message payloads.
//!
//! A SEND_MESSAGE request carries three newline-separated fields:
//!
//! ```text
//! sender\nreceiver\ntext
//! ```
//!
//! The text is the remainder of the payload and may itself contain newlines.

use std::fmt;

/// A text message from one account to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Username of the sending account.
    pub sender: String,
    /// Username of the receiving account.
    pub receiver: String,
    /// Message body.
    pub text: String,
}

/// Returned when a payload does not contain all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedMessage;

impl fmt::Display for MalformedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected sender, receiver and text separated by newlines")
    }
}

impl std::error::Error for MalformedMessage {}

impl ChatMessage {
    /// Creates a new message.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            text: text.into(),
        }
    }

    /// Parses a SEND_MESSAGE payload. Each field is trimmed of surrounding
    /// whitespace.
    pub fn parse(payload: &str) -> Result<Self, MalformedMessage> {
        let mut fields = payload.splitn(3, '\n');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(sender), Some(receiver), Some(text)) => {
                Ok(Self::new(sender.trim(), receiver.trim(), text.trim()))
            }
            _ => Err(MalformedMessage),
        }
    }

    /// Encodes the message as a SEND_MESSAGE payload.
    pub fn to_payload(&self) -> String {
        format!("{}\n{}\n{}", self.sender, self.receiver, self.text)
    }

    /// The line shown to the receiver, e.g. `<alice>: hi`.
    pub fn display_line(&self) -> String {
        format!("<{}>: {}", self.sender, self.text)
    }
}
