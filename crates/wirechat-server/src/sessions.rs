//! Connection bookkeeping: the set of open connections and the
//! username → connection sessions bound on LOGIN.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tracing::debug;

use wirechat_protocol::{Frame, FrameWriter, ProtocolResult};

use crate::error::{ChatError, ChatResult};
use crate::signals::{ShutdownHandle, ShutdownSignal};

/// Write half of a connection, type-erased so tests can use in-memory pipes.
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Server-assigned identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to an open connection.
///
/// Cloned into the registry so other tasks can push frames to it. Writes are
/// serialized by a per-connection lock, never by the registry lock. With a
/// write timeout set, waiting for that lock counts against the same limit.
#[derive(Clone)]
pub struct ClientHandle {
    id: ConnectionId,
    peer: Arc<str>,
    writer: Arc<Mutex<FrameWriter<BoxedWriter>>>,
    closed: ShutdownHandle,
    write_timeout: Option<Duration>,
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ClientHandle {
    /// Wraps the write half of a connection.
    pub fn new<W>(id: ConnectionId, peer: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let writer: BoxedWriter = Box::pin(writer);
        Self {
            id,
            peer: Arc::from(peer.into()),
            writer: Arc::new(Mutex::new(FrameWriter::new(writer))),
            closed: ShutdownHandle::new(),
            write_timeout: None,
        }
    }

    /// Builder: fail writes that block for longer than `timeout`.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the peer address as text.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Writes one frame to the connection.
    ///
    /// Fails with [`io::ErrorKind::TimedOut`] if the write timeout elapses
    /// first; the frame may then have been partly written.
    pub async fn send(&self, frame: &Frame) -> ProtocolResult<()> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_frame(frame).await
        };
        match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, write)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?,
            None => write.await,
        }
    }

    /// Marks the connection closed and shuts down its write half.
    ///
    /// The connection's own task observes [`ClientHandle::closed`] and stops
    /// reading. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.is_shutdown() {
            return;
        }
        self.closed.trigger();
        let shutdown = async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        };
        let result = match self.write_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, shutdown).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(conn_id = %self.id, "Shutdown of closed connection timed out");
                    return;
                }
            },
            None => shutdown.await,
        };
        if let Err(e) = result {
            debug!(conn_id = %self.id, error = %e, "Shutdown of closed connection failed");
        }
    }

    /// Returns true once [`ClientHandle::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_shutdown()
    }

    /// Returns a future that completes when the connection is closed.
    pub fn closed(&self) -> ShutdownSignal {
        self.closed.wait()
    }
}

/// All open connections plus the sessions bound to them.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ConnectionId, ClientHandle>,
    sessions: HashMap<String, ConnectionId>,
    usernames: HashMap<ConnectionId, String>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly accepted connection.
    pub fn register(&mut self, handle: ClientHandle) {
        self.clients.insert(handle.id(), handle);
    }

    /// Removes a connection and any session bound to it.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ClientHandle> {
        self.logout_by_connection(id);
        self.clients.remove(&id)
    }

    /// Returns true if the connection is still registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Binds `username` to connection `id`.
    ///
    /// The caller checks that the account exists. A connection that is
    /// already logged in under another name is rebound.
    pub fn bind(&mut self, username: &str, id: ConnectionId) -> ChatResult<()> {
        if self.sessions.contains_key(username) {
            return Err(ChatError::AlreadyLoggedIn {
                username: username.to_string(),
            });
        }
        self.logout_by_connection(id);
        self.sessions.insert(username.to_string(), id);
        self.usernames.insert(id, username.to_string());
        Ok(())
    }

    /// Drops the session bound to `id`, if any, returning its username.
    pub fn logout_by_connection(&mut self, id: ConnectionId) -> Option<String> {
        let username = self.usernames.remove(&id)?;
        self.sessions.remove(&username);
        Some(username)
    }

    /// Returns true if `username` has a live session.
    pub fn is_online(&self, username: &str) -> bool {
        self.sessions.contains_key(username)
    }

    /// Returns the connection `username` is logged in on.
    pub fn connection_for(&self, username: &str) -> Option<ClientHandle> {
        let id = self.sessions.get(username)?;
        self.clients.get(id).cloned()
    }

    /// Returns the username logged in on connection `id`.
    pub fn username_for(&self, id: ConnectionId) -> Option<&str> {
        self.usernames.get(&id).map(String::as_str)
    }

    /// Removes every connection and session, returning the connections.
    pub fn drain(&mut self) -> Vec<ClientHandle> {
        self.sessions.clear();
        self.usernames.clear();
        let mut handles: Vec<_> = self.clients.drain().map(|(_, handle)| handle).collect();
        handles.sort_by_key(ClientHandle::id);
        handles
    }

    /// Returns the number of open connections.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Returns the number of logged-in sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
