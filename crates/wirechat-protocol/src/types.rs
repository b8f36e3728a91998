//! Operation codes carried in the frame header.
//!
//! Requests and responses share one code space: requests use 0..=6 and
//! responses use 7..=10, so a frame's direction is evident from its code.

use std::fmt;

/// Operations a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestCode {
    /// Bind the connection to an existing account.
    Login = 0,
    /// Register a new username.
    CreateAccount = 1,
    /// Remove an account that is not logged in.
    DeleteAccount = 2,
    /// List usernames matching a glob pattern.
    ListAccounts = 3,
    /// Send a message to another account.
    SendMessage = 4,
    /// Drain the caller's offline message queue.
    ViewMessages = 5,
    /// Close the connection.
    Disconnect = 6,
}

impl RequestCode {
    /// All request codes, in wire order.
    pub const ALL: [RequestCode; 7] = [
        RequestCode::Login,
        RequestCode::CreateAccount,
        RequestCode::DeleteAccount,
        RequestCode::ListAccounts,
        RequestCode::SendMessage,
        RequestCode::ViewMessages,
        RequestCode::Disconnect,
    ];

    /// Returns the wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the protocol name of the operation.
    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::CreateAccount => "CREATE_ACCOUNT",
            Self::DeleteAccount => "DELETE_ACCOUNT",
            Self::ListAccounts => "LIST_ACCOUNTS",
            Self::SendMessage => "SEND_MESSAGE",
            Self::ViewMessages => "VIEW_MESSAGES",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl TryFrom<u8> for RequestCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_u8() == value)
            .ok_or(value)
    }
}

impl From<RequestCode> for u8 {
    fn from(code: RequestCode) -> Self {
        code.as_u8()
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status codes the server answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseCode {
    /// The request succeeded, or an unsolicited message push.
    Success = 7,
    /// The request was understood but refused.
    Failure = 8,
    /// The server is closing the connection.
    Disconnect = 9,
    /// The peer violated the wire protocol.
    ProtocolErr = 10,
}

impl ResponseCode {
    /// All response codes, in wire order.
    pub const ALL: [ResponseCode; 4] = [
        ResponseCode::Success,
        ResponseCode::Failure,
        ResponseCode::Disconnect,
        ResponseCode::ProtocolErr,
    ];

    /// Returns the wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the protocol name of the status.
    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Disconnect => "DISCONNECT",
            Self::ProtocolErr => "PROTOCOL_ERR",
        }
    }

    /// Returns true for [`ResponseCode::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_u8() == value)
            .ok_or(value)
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        code.as_u8()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
