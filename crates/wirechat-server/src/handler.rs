//! Request dispatch and the per-connection loop.
//!
//! [`RequestHandler::handle`] turns one decoded request into a [`Reply`];
//! [`RequestHandler::handle_connection`] drives a connection from accept to
//! release, writing each reply before reading the next request.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use wirechat_core::ChatMessage;
use wirechat_protocol::{Frame, ProtocolError, RequestCode, ResponseCode};

use crate::error::{ChatError, ServerError, ServerResult};
use crate::sessions::ClientHandle;
use crate::socket::Connection;
use crate::state::{Delivery, SharedState};

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status written in the response header.
    pub status: ResponseCode,
    /// Response payload.
    pub message: String,
    /// False once the connection should be closed instead of answered.
    pub keep_open: bool,
}

impl Reply {
    /// SUCCESS, connection stays open.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseCode::Success,
            message: message.into(),
            keep_open: true,
        }
    }

    /// FAILURE, connection stays open.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseCode::Failure,
            message: message.into(),
            keep_open: true,
        }
    }

    /// Close the connection without writing anything.
    pub fn close(message: impl Into<String>) -> Self {
        Self {
            status: ResponseCode::Disconnect,
            message: message.into(),
            keep_open: false,
        }
    }

    /// Builds the response frame.
    pub fn to_frame(&self) -> Frame {
        Frame::response(self.status, self.message.as_str())
    }
}

impl From<ChatError> for Reply {
    fn from(error: ChatError) -> Self {
        Self::failure(error.to_string())
    }
}

/// Request handler that processes client requests.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    state: SharedState,
}

impl RequestHandler {
    /// Creates a new request handler with the given state.
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Handles a single request from `conn` and returns the reply.
    #[tracing::instrument(skip_all, fields(conn_id = %conn.id(), op = operation, request))]
    pub async fn handle(&self, conn: &ClientHandle, operation: u8, payload: &str) -> Reply {
        let Ok(request) = RequestCode::try_from(operation) else {
            warn!(operation, "Unrecognized operation");
            return Reply::failure("Unrecognized Response");
        };
        tracing::Span::current().record("request", request.name());

        match request {
            RequestCode::Login => match self.state.login(payload, conn.id()).await {
                Ok(()) => Reply::success("User logged in"),
                Err(e) => e.into(),
            },
            RequestCode::CreateAccount => match self.state.create_account(payload).await {
                Ok(()) => Reply::success("User Created"),
                Err(e) => e.into(),
            },
            RequestCode::DeleteAccount => match self.state.delete_account(payload).await {
                Ok(()) => Reply::success("Account deleted successfully"),
                Err(e) => e.into(),
            },
            RequestCode::ListAccounts => match self.state.list_accounts(payload).await {
                Ok(names) => {
                    debug!(matches = names.len(), "Listing accounts");
                    Reply::success(names.join("\n"))
                }
                Err(e) => e.into(),
            },
            RequestCode::SendMessage => match ChatMessage::parse(payload) {
                Ok(message) => self.send_message(message).await,
                Err(_) => ChatError::MalformedMessage.into(),
            },
            RequestCode::ViewMessages => match self.state.view_messages(conn.id()).await {
                Ok(lines) => Reply::success(lines),
                Err(e) => e.into(),
            },
            RequestCode::Disconnect => {
                self.release(conn).await;
                Reply::close("Disconnected!")
            }
        }
    }

    async fn send_message(&self, message: ChatMessage) -> Reply {
        let receiver = match self.state.route_message(&message).await {
            Ok(Delivery::Online(receiver)) => receiver,
            Ok(Delivery::Offline) => {
                debug!(receiver = %message.receiver, "Receiver offline, message queued");
                return Reply::success("Message Queued.");
            }
            Err(e) => return e.into(),
        };

        let push = Frame::response(ResponseCode::Success, message.display_line());
        match receiver.send(&push).await {
            Ok(()) => {
                debug!(receiver = %message.receiver, conn_id = %receiver.id(), "Message pushed");
                Reply::success("Message sent.")
            }
            Err(e) => {
                warn!(
                    receiver = %message.receiver,
                    conn_id = %receiver.id(),
                    error = %e,
                    "Push failed, releasing receiver"
                );
                self.release(&receiver).await;
                match self
                    .state
                    .enqueue_message(&message.receiver, message.display_line())
                    .await
                {
                    Ok(()) => Reply::success("Message Queued."),
                    Err(e) => e.into(),
                }
            }
        }
    }

    /// Removes `conn` from the shared state and closes it.
    async fn release(&self, conn: &ClientHandle) {
        self.state.release_client(conn.id()).await;
        conn.close().await;
    }

    /// Handles a connection, processing all requests until it closes.
    ///
    /// The connection is always released on return. A peer that simply went
    /// away is not an error.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        let handle = conn.handle().clone();
        let mut guard = ReleaseGuard::new(self.state.clone(), handle.clone());

        let result = self.serve(&mut conn).await;
        self.release(&handle).await;
        guard.disarm();

        match result {
            Err(e) if e.is_connection_lost() => {
                debug!(conn_id = %handle.id(), peer = %handle.peer(), error = %e, "Connection lost");
                Ok(())
            }
            other => other,
        }
    }

    async fn serve(&self, conn: &mut Connection) -> ServerResult<()> {
        let handle = conn.handle().clone();
        loop {
            let read = tokio::select! {
                _ = handle.closed().wait() => {
                    debug!(conn_id = %handle.id(), "Connection closed by server");
                    return Ok(());
                }
                read = conn.read_request() => read,
            };

            let frame = match read {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(conn_id = %handle.id(), peer = %handle.peer(), "Client disconnected");
                    return Ok(());
                }
                Err(ServerError::Protocol(ProtocolError::UnsupportedVersion {
                    version,
                    expected,
                })) => {
                    warn!(conn_id = %handle.id(), version, expected, "Unsupported protocol version");
                    let reject = Frame::response(
                        ResponseCode::ProtocolErr,
                        format!("Unsupported protocol version {}", version),
                    );
                    if let Err(e) = handle.send(&reject).await {
                        debug!(conn_id = %handle.id(), error = %e, "Failed to send protocol error");
                    }
                    return Err(ProtocolError::UnsupportedVersion { version, expected }.into());
                }
                Err(e) => return Err(e),
            };

            let reply = self.handle(&handle, frame.operation, &frame.payload).await;
            if !reply.keep_open {
                return Ok(());
            }
            handle.send(&reply.to_frame()).await?;
        }
    }
}

/// Releases a connection whose task ends without doing so itself, e.g. on
/// panic or abort.
struct ReleaseGuard {
    state: SharedState,
    handle: ClientHandle,
    armed: bool,
}

impl ReleaseGuard {
    fn new(state: SharedState, handle: ClientHandle) -> Self {
        Self {
            state,
            handle,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        let handle = self.handle.clone();
        runtime.spawn(async move {
            state.release_client(handle.id()).await;
            handle.close().await;
        });
    }
}

/// Creates a connection handler function for use with
/// [`ChatServer::run_until_shutdown`](crate::ChatServer::run_until_shutdown).
pub fn make_connection_handler(
    state: SharedState,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    move |conn| {
        let handler = RequestHandler::new(state.clone());
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await
                && !matches!(e, ServerError::Shutdown)
            {
                warn!(error = %e, "Connection handler error");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::ConnectionId;
    use crate::state::new_shared_state;
    use wirechat_protocol::{FrameReader, FrameWriter, PROTOCOL_VERSION};

    async fn connect(state: &SharedState) -> ClientHandle {
        let id = state.next_connection_id();
        let handle = ClientHandle::new(id, "test", tokio::io::sink());
        state.register_client(handle.clone()).await;
        handle
    }

    async fn call(
        handler: &RequestHandler,
        conn: &ClientHandle,
        op: RequestCode,
        payload: &str,
    ) -> Reply {
        handler.handle(conn, op.as_u8(), payload).await
    }

    #[tokio::test]
    async fn unrecognized_operation() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let conn = connect(&state).await;

        for op in [11u8, 42, 255] {
            let reply = handler.handle(&conn, op, "").await;
            assert_eq!(reply, Reply::failure("Unrecognized Response"));
        }
    }

    #[tokio::test]
    async fn account_lifecycle_replies() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let conn = connect(&state).await;

        let reply = call(&handler, &conn, RequestCode::CreateAccount, "alice").await;
        assert_eq!(reply, Reply::success("User Created"));
        let reply = call(&handler, &conn, RequestCode::CreateAccount, "alice").await;
        assert_eq!(reply, Reply::failure("Username already exists"));

        let reply = call(&handler, &conn, RequestCode::Login, "alice").await;
        assert_eq!(reply, Reply::success("User logged in"));
        let reply = call(&handler, &conn, RequestCode::DeleteAccount, "alice").await;
        assert_eq!(reply, Reply::failure("Account is logged in right now"));

        state.logout(conn.id()).await;
        let reply = call(&handler, &conn, RequestCode::DeleteAccount, "alice").await;
        assert_eq!(reply, Reply::success("Account deleted successfully"));
        let reply = call(&handler, &conn, RequestCode::DeleteAccount, "alice").await;
        assert_eq!(reply, Reply::failure("Account not found"));
        let reply = call(&handler, &conn, RequestCode::Login, "alice").await;
        assert_eq!(reply, Reply::failure("Username does not exist"));
    }

    #[tokio::test]
    async fn list_replies() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let conn = connect(&state).await;

        for name in ["john", "bob", "jane"] {
            call(&handler, &conn, RequestCode::CreateAccount, name).await;
        }

        let reply = call(&handler, &conn, RequestCode::ListAccounts, "j*").await;
        assert_eq!(reply, Reply::success("jane\njohn"));
        let reply = call(&handler, &conn, RequestCode::ListAccounts, "q?").await;
        assert_eq!(reply, Reply::failure("No matching accounts found."));
    }

    #[tokio::test]
    async fn send_and_view_replies() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let conn = connect(&state).await;

        call(&handler, &conn, RequestCode::CreateAccount, "alice").await;
        call(&handler, &conn, RequestCode::CreateAccount, "bob").await;

        let reply = call(&handler, &conn, RequestCode::ViewMessages, "").await;
        assert_eq!(reply, Reply::failure("Server thinks user does not exist."));

        let reply = call(&handler, &conn, RequestCode::SendMessage, "alice\nbob\nhi").await;
        assert_eq!(reply, Reply::success("Message Queued."));
        let reply = call(&handler, &conn, RequestCode::SendMessage, "alice\ncarol\nhi").await;
        assert_eq!(reply, Reply::failure("Receiver not found."));
        let reply = call(&handler, &conn, RequestCode::SendMessage, "alice\nbob").await;
        assert_eq!(reply, Reply::failure("Malformed message request"));

        call(&handler, &conn, RequestCode::Login, "bob").await;
        let reply = call(&handler, &conn, RequestCode::ViewMessages, "").await;
        assert_eq!(reply, Reply::success("<alice>: hi"));
        let reply = call(&handler, &conn, RequestCode::ViewMessages, "").await;
        assert_eq!(reply, Reply::success(""));
    }

    #[tokio::test]
    async fn online_receiver_gets_push() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let sender = connect(&state).await;

        let (ours, theirs) = tokio::io::duplex(256);
        let receiver = ClientHandle::new(state.next_connection_id(), "bob", ours);
        state.register_client(receiver.clone()).await;

        call(&handler, &sender, RequestCode::CreateAccount, "bob").await;
        call(&handler, &receiver, RequestCode::Login, "bob").await;

        let reply = call(&handler, &sender, RequestCode::SendMessage, "alice\nbob\nhi").await;
        assert_eq!(reply, Reply::success("Message sent."));

        let mut reader = FrameReader::new(theirs);
        let push = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(push.response_code(), Some(ResponseCode::Success));
        assert_eq!(push.payload, "<alice>: hi");
        assert_eq!(state.pending_messages("bob").await, 0);
    }

    #[tokio::test]
    async fn failed_push_releases_receiver_and_queues() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let sender = connect(&state).await;

        let (ours, theirs) = tokio::io::duplex(256);
        drop(theirs);
        let receiver = ClientHandle::new(state.next_connection_id(), "bob", ours);
        state.register_client(receiver.clone()).await;

        call(&handler, &sender, RequestCode::CreateAccount, "bob").await;
        call(&handler, &receiver, RequestCode::Login, "bob").await;

        let reply = call(&handler, &sender, RequestCode::SendMessage, "alice\nbob\nhi").await;
        assert_eq!(reply, Reply::success("Message Queued."));
        assert!(!state.is_online("bob").await);
        assert!(receiver.is_closed());
        assert_eq!(state.drain_messages("bob").await, "<alice>: hi");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_push_times_out_and_queues() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let sender = connect(&state).await;

        let (ours, _theirs) = tokio::io::duplex(16);
        let receiver = ClientHandle::new(state.next_connection_id(), "bob", ours)
            .with_write_timeout(std::time::Duration::from_secs(2));
        state.register_client(receiver.clone()).await;

        call(&handler, &sender, RequestCode::CreateAccount, "bob").await;
        call(&handler, &receiver, RequestCode::Login, "bob").await;

        let payload = format!("alice\nbob\n{}", "x".repeat(512));
        let reply = call(&handler, &sender, RequestCode::SendMessage, &payload).await;
        assert_eq!(reply, Reply::success("Message Queued."));
        assert!(!state.is_online("bob").await);
        assert!(receiver.is_closed());
        assert_eq!(state.pending_messages("bob").await, 1);
    }

    #[tokio::test]
    async fn disconnect_releases_connection() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());
        let conn = connect(&state).await;

        call(&handler, &conn, RequestCode::CreateAccount, "alice").await;
        call(&handler, &conn, RequestCode::Login, "alice").await;

        let reply = call(&handler, &conn, RequestCode::Disconnect, "").await;
        assert_eq!(reply.message, "Disconnected!");
        assert!(!reply.keep_open);
        assert!(!state.is_online("alice").await);
        assert_eq!(state.client_count().await, 0);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn connection_loop_answers_and_releases() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());

        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let handle = ClientHandle::new(ConnectionId(99), "duplex", server_write);
        state.register_client(handle.clone()).await;
        let task = tokio::spawn({
            let handler = handler.clone();
            async move { handler.handle_connection(Connection::new(server_read, handle)).await }
        });

        let (client_read, client_write) = tokio::io::split(client);
        let mut reader = FrameReader::new(client_read);
        let mut writer = FrameWriter::new(client_write);

        writer
            .write_frame(&Frame::request(RequestCode::CreateAccount, "alice"))
            .await
            .unwrap();
        let reply = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(reply.response_code(), Some(ResponseCode::Success));
        assert_eq!(reply.payload, "User Created");

        writer
            .write_frame(&Frame::request(RequestCode::Login, "alice"))
            .await
            .unwrap();
        reader.read_frame().await.unwrap().unwrap();
        assert!(state.is_online("alice").await);

        writer
            .write_frame(&Frame::new(PROTOCOL_VERSION, 200, ""))
            .await
            .unwrap();
        let reply = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(reply.response_code(), Some(ResponseCode::Failure));
        assert_eq!(reply.payload, "Unrecognized Response");

        writer.shutdown().await.unwrap();
        assert!(task.await.unwrap().is_ok());
        assert!(!state.is_online("alice").await);
        assert_eq!(state.client_count().await, 0);
    }

    #[tokio::test]
    async fn connection_loop_rejects_foreign_version() {
        let state = new_shared_state();
        let handler = RequestHandler::new(state.clone());

        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let handle = ClientHandle::new(ConnectionId(5), "duplex", server_write);
        state.register_client(handle.clone()).await;
        let task = tokio::spawn(async move {
            handler
                .handle_connection(Connection::new(server_read, handle))
                .await
        });

        let (client_read, client_write) = tokio::io::split(client);
        let mut reader = FrameReader::new(client_read);
        let mut writer = FrameWriter::new(client_write);
        writer
            .write_frame(&Frame::new(7, RequestCode::Login.as_u8(), "alice"))
            .await
            .unwrap();

        let reply = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(reply.response_code(), Some(ResponseCode::ProtocolErr));
        assert!(reply.payload.contains('7'));
        assert!(reader.read_frame().await.unwrap().is_none());

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::UnsupportedVersion { version: 7, .. }))
        ));
        assert_eq!(state.client_count().await, 0);
    }
}
