//! TCP client for talking to a wirechat server.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use wirechat_protocol::{Frame, FrameReader, FrameWriter, RequestCode, ResponseCode};

use crate::error::{ClientError, ClientResult};

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status from the frame header.
    pub status: ResponseCode,
    /// Payload text.
    pub message: String,
}

impl Response {
    /// Builds a response from a received frame.
    pub fn from_frame(frame: Frame) -> ClientResult<Self> {
        let status = frame.response_code().ok_or_else(|| {
            ClientError::Protocol(format!("unexpected operation {} in reply", frame.operation))
        })?;
        Ok(Self {
            status,
            message: frame.payload,
        })
    }

    /// Returns the message on SUCCESS, an error otherwise.
    pub fn into_result(self) -> ClientResult<String> {
        match self.status {
            ResponseCode::Success => Ok(self.message),
            ResponseCode::Failure => Err(ClientError::Refused(self.message)),
            ResponseCode::Disconnect => Err(ClientError::Disconnected(self.message)),
            ResponseCode::ProtocolErr => Err(ClientError::Protocol(self.message)),
        }
    }
}

/// A connected chat client.
pub struct ChatClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    timeout: Duration,
}

impl ChatClient {
    /// Connects to `address` (`host:port`).
    pub async fn connect(address: &str, timeout: Duration) -> ClientResult<Self> {
        debug!(address, "connecting to server");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connection timed out after {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!("failed to connect to {}: {}", address, e))
            })?;
        stream.set_nodelay(true)?;

        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
            timeout,
        })
    }

    /// Sends a request without waiting for the reply.
    pub async fn send(&mut self, code: RequestCode, payload: &str) -> ClientResult<()> {
        debug!(request = code.name(), "sending request");
        self.writer
            .write_frame(&Frame::request(code, payload))
            .await?;
        Ok(())
    }

    /// Reads the next frame, or `None` once the server closed the connection.
    pub async fn read_frame(&mut self) -> ClientResult<Option<Frame>> {
        Ok(self.reader.read_frame().await?)
    }

    /// Sends a request and waits for its reply.
    pub async fn call(&mut self, code: RequestCode, payload: &str) -> ClientResult<Response> {
        self.send(code, payload).await?;

        let frame = tokio::time::timeout(self.timeout, self.read_frame())
            .await
            .map_err(|_| ClientError::Timeout(format!("waiting for {} reply", code.name())))??
            .ok_or_else(|| ClientError::Connection("server closed the connection".into()))?;

        let response = Response::from_frame(frame)?;
        debug!(status = response.status.name(), "response received");
        Ok(response)
    }

    /// Sends DISCONNECT and shuts down the write half.
    pub async fn disconnect(mut self) -> ClientResult<()> {
        self.send(RequestCode::Disconnect, "").await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Splits into independent read and write halves.
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}
