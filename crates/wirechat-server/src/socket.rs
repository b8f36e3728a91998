//! TCP listener and per-connection framing.
//!
//! [`ChatServer`] accepts connections, registers them in the shared state and
//! hands each one to a connection handler task. On shutdown it tells every
//! remaining client it has been disconnected and waits for the tasks to wind
//! down.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use wirechat_protocol::{Frame, FrameReader, PROTOCOL_VERSION, ProtocolError, ResponseCode};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::sessions::ClientHandle;
use crate::state::SharedState;

/// Payload of the frame sent to every client on shutdown.
pub const SHUTDOWN_MESSAGE: &str = "You have been disconnected!";

/// Read half of a connection, type-erased so tests can use in-memory pipes.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// TCP server for chat clients.
pub struct ChatServer {
    /// Server configuration.
    config: ServerConfig,
    /// TCP listener.
    listener: TcpListener,
    /// Accounts, connections and sessions.
    state: SharedState,
    /// Semaphore for limiting concurrent connections.
    connection_semaphore: Arc<Semaphore>,
}

impl ChatServer {
    /// Binds the listener described by `config`.
    pub async fn bind(config: ServerConfig, state: SharedState) -> ServerResult<Self> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::bind(address.clone(), e))?;
        info!(
            address = %listener.local_addr().map_or(address, |a| a.to_string()),
            "Chat server listening"
        );

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            state,
            connection_semaphore,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the shared state.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Accepts a single connection and registers it.
    ///
    /// Waits for a free slot first when `max_connections` are already open.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let id = self.state.next_connection_id();
        let (reader, writer) = stream.into_split();
        let handle = ClientHandle::new(id, peer.to_string(), writer)
            .with_write_timeout(self.config.write_timeout);
        self.state.register_client(handle.clone()).await;
        info!(peer = %peer, conn_id = %id, "Accepted connection");

        Ok(Connection::new(reader, handle)
            .with_idle_timeout(self.config.idle_timeout)
            .with_max_payload(self.config.max_payload_size)
            .with_permit(permit))
    }

    /// Runs the accept loop until `shutdown` completes, then shuts down
    /// gracefully.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok(connection) => {
                        tasks.spawn(handler(connection));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    error!(error = %e, "Connection task panicked");
                }
            }
        }

        self.shutdown(tasks).await;
        Ok(())
    }

    /// Disconnects every client and waits for the connection tasks.
    ///
    /// Each phase is bounded by `shutdown_timeout`, so a client that stops
    /// reading cannot hold shutdown up.
    async fn shutdown(&self, mut tasks: JoinSet<()>) {
        let clients = self.state.drain_clients().await;
        info!(clients = clients.len(), "Disconnecting clients");

        let timeout = self.config.shutdown_timeout;
        let goodbye = Frame::response(ResponseCode::Disconnect, SHUTDOWN_MESSAGE);
        let mut notices = JoinSet::new();
        for client in clients {
            let goodbye = goodbye.clone();
            notices.spawn(async move {
                if let Err(e) = client.send(&goodbye).await {
                    debug!(conn_id = %client.id(), error = %e, "Failed to notify client");
                }
                client.close().await;
            });
        }
        let notified = tokio::time::timeout(timeout, async {
            while notices.join_next().await.is_some() {}
        })
        .await;
        if notified.is_err() {
            warn!(
                remaining = notices.len(),
                timeout_ms = timeout.as_millis(),
                "Clients could not be notified in time"
            );
            notices.shutdown().await;
        }

        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                timeout_ms = timeout.as_millis(),
                "Connection tasks did not finish in time, aborting"
            );
            tasks.shutdown().await;
        }

        self.state.clear().await;
        info!("Server stopped");
    }
}

/// A client connection as seen by its handler task.
pub struct Connection {
    reader: FrameReader<BoxedReader>,
    handle: ClientHandle,
    idle_timeout: Option<Duration>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Connection {
    /// Wraps the read half of a connection whose write half lives in `handle`.
    pub fn new<R>(reader: R, handle: ClientHandle) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let reader: BoxedReader = Box::pin(reader);
        Self {
            reader: FrameReader::new(reader),
            handle,
            idle_timeout: None,
            _permit: None,
        }
    }

    /// Builder: release the connection after this long without a request.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builder: reject frames announcing a larger payload.
    pub fn with_max_payload(mut self, max: Option<u32>) -> Self {
        self.reader = self.reader.with_max_payload(max);
        self
    }

    fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Returns the shared handle of this connection.
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Reads the next request frame.
    ///
    /// Returns `Ok(None)` if the peer closed the connection between frames.
    /// A header with a foreign version is rejected before its payload is read.
    pub async fn read_request(&mut self) -> ServerResult<Option<Frame>> {
        match self.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_frame())
                .await
                .map_err(|_| ServerError::IdleTimeout(timeout))?,
            None => self.read_frame().await,
        }
    }

    async fn read_frame(&mut self) -> ServerResult<Option<Frame>> {
        let Some(header) = self.reader.read_header().await? else {
            return Ok(None);
        };
        if header.version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                version: header.version,
                expected: PROTOCOL_VERSION,
            }
            .into());
        }
        let payload = self.reader.read_payload(&header).await?;
        Ok(Some(Frame::new(header.version, header.operation, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::ConnectionId;
    use crate::state::new_shared_state;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use wirechat_protocol::{FrameWriter, RequestCode};

    fn loopback() -> ServerConfig {
        ServerConfig::new("127.0.0.1", 0).with_shutdown_timeout(Duration::from_millis(200))
    }

    fn in_memory(bytes: &'static [u8]) -> Connection {
        let handle = ClientHandle::new(ConnectionId(1), "memory", tokio::io::sink());
        Connection::new(bytes, handle)
    }

    #[tokio::test]
    async fn bind_reports_local_addr() {
        let server = ChatServer::bind(loopback(), new_shared_state())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_names_address() {
        let first = ChatServer::bind(loopback(), new_shared_state())
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let config = ServerConfig::new("127.0.0.1", port);
        let result = ChatServer::bind(config, new_shared_state()).await;
        match result {
            Err(ServerError::Bind { address, .. }) => {
                assert_eq!(address, format!("127.0.0.1:{}", port))
            }
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn accept_registers_connection() {
        let server = ChatServer::bind(loopback(), new_shared_state())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let conn = server.accept().await.unwrap();
        let _stream = client.await.unwrap();

        assert_eq!(server.state().client_count().await, 1);
        assert!(!conn.handle().is_closed());
    }

    #[tokio::test]
    async fn connection_reads_frames_in_order() {
        let (client, server_side) = tokio::io::duplex(256);
        let handle = ClientHandle::new(ConnectionId(1), "duplex", tokio::io::sink());
        let mut conn = Connection::new(server_side, handle);

        let mut writer = FrameWriter::new(client);
        writer
            .write_frame(&Frame::request(RequestCode::CreateAccount, "alice"))
            .await
            .unwrap();
        writer
            .write_frame(&Frame::request(RequestCode::Login, "alice"))
            .await
            .unwrap();
        drop(writer);

        let first = conn.read_request().await.unwrap().unwrap();
        assert_eq!(first.request_code(), Some(RequestCode::CreateAccount));
        let second = conn.read_request().await.unwrap().unwrap();
        assert_eq!(second.request_code(), Some(RequestCode::Login));
        assert_eq!(second.payload, "alice");
        assert!(conn.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_version_is_rejected() {
        let mut conn = in_memory(&[2, 0, 0, 0, 1, 0, b'x']);
        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Protocol(ProtocolError::UnsupportedVersion { version: 2, expected: 1 })
        ));
    }

    #[tokio::test]
    async fn short_header_is_connection_lost() {
        let mut conn = in_memory(&[1, 0, 0]);
        let err = conn.read_request().await.unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let mut conn = in_memory(&[1, 0, 0, 0, 9, 0]).with_max_payload(Some(4));
        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Protocol(ProtocolError::PayloadTooLarge { size: 9, max: 4 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        let (_client, server_side) = tokio::io::duplex(64);
        let handle = ClientHandle::new(ConnectionId(1), "duplex", tokio::io::sink());
        let mut conn =
            Connection::new(server_side, handle).with_idle_timeout(Some(Duration::from_secs(5)));

        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(err, ServerError::IdleTimeout(_)));
    }

    #[tokio::test]
    async fn shutdown_notifies_connected_clients() {
        let server = ChatServer::bind(loopback(), new_shared_state())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server_task = tokio::spawn(async move {
            let handler = |mut conn: Connection| async move {
                while let Ok(Some(_)) = conn.read_request().await {}
            };
            server
                .run_until_shutdown(handler, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        // Let the accept loop register the connection before stopping.
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(()).unwrap();

        let mut reader = FrameReader::new(&mut stream);
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.response_code(), Some(ResponseCode::Disconnect));
        assert_eq!(frame.payload, SHUTDOWN_MESSAGE);

        let result = tokio::time::timeout(Duration::from_secs(2), server_task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        stream.shutdown().await.ok();
    }
}
