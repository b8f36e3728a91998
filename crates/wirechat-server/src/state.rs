//! Shared server state.
//!
//! Two locks guard everything mutable:
//!
//! 1. `accounts`: the [`AccountStore`] and its queues.
//! 2. `registry`: open connections and sessions.
//!
//! Any path that needs both takes `accounts` first. Neither lock is ever held
//! across socket I/O: operations return the handles they need and the caller
//! writes after the guards are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use wirechat_core::{ChatMessage, GlobPattern};

use crate::accounts::AccountStore;
use crate::error::{ChatError, ChatResult};
use crate::sessions::{ClientHandle, ConnectionId, Registry};

/// Where a routed message ended up.
#[derive(Debug)]
pub enum Delivery {
    /// Receiver is logged in; the caller pushes the line to this connection.
    Online(ClientHandle),
    /// Receiver is offline; the line was appended to its queue.
    Offline,
}

/// Accounts, connections and sessions shared by every connection task.
#[derive(Debug, Default)]
pub struct ChatState {
    accounts: RwLock<AccountStore>,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

/// Shared server state wrapped in an Arc.
pub type SharedState = Arc<ChatState>;

/// Creates a new shared state.
pub fn new_shared_state() -> SharedState {
    Arc::new(ChatState::new())
}

impl ChatState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id for a new connection.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    // --- connections ---

    /// Adds a connection to the client set.
    pub async fn register_client(&self, handle: ClientHandle) {
        let mut registry = self.registry.lock().await;
        registry.register(handle);
        debug!(clients = registry.client_count(), "Client registered");
    }

    /// Removes a connection from the client set and revokes its session.
    ///
    /// Idempotent; returns the handle if it was still registered.
    pub async fn release_client(&self, id: ConnectionId) -> Option<ClientHandle> {
        let mut registry = self.registry.lock().await;
        let username = registry.username_for(id).map(str::to_owned);
        let handle = registry.unregister(id);
        if handle.is_some() {
            debug!(
                conn_id = %id,
                username = username.as_deref().unwrap_or("-"),
                clients = registry.client_count(),
                "Client released"
            );
        }
        handle
    }

    /// Removes every connection and session, returning the connections.
    pub async fn drain_clients(&self) -> Vec<ClientHandle> {
        self.registry.lock().await.drain()
    }

    /// Returns the number of open connections.
    pub async fn client_count(&self) -> usize {
        self.registry.lock().await.client_count()
    }

    // --- accounts ---

    /// Registers a new account.
    pub async fn create_account(&self, username: &str) -> ChatResult<()> {
        self.accounts.write().await.create(username)?;
        info!(username, "Account created");
        Ok(())
    }

    /// Deletes an account unless it is logged in.
    pub async fn delete_account(&self, username: &str) -> ChatResult<()> {
        let mut accounts = self.accounts.write().await;
        if self.registry.lock().await.is_online(username) {
            return Err(ChatError::AccountLoggedIn {
                username: username.to_string(),
            });
        }
        let removed = accounts.remove(username)?;
        info!(
            username,
            dropped_messages = removed.pending(),
            "Account deleted"
        );
        Ok(())
    }

    /// Lists usernames matching a glob pattern. The pattern is trimmed first.
    pub async fn list_accounts(&self, pattern: &str) -> ChatResult<Vec<String>> {
        let pattern = GlobPattern::new(pattern.trim())?;
        let accounts = self.accounts.read().await;
        let matches: Vec<String> = accounts
            .matching(&pattern)
            .into_iter()
            .map(str::to_owned)
            .collect();
        if matches.is_empty() {
            return Err(ChatError::NoMatchingAccounts);
        }
        Ok(matches)
    }

    /// Returns true if `username` is registered.
    pub async fn account_exists(&self, username: &str) -> bool {
        self.accounts.read().await.contains(username)
    }

    /// Appends a line to an account's queue.
    pub async fn enqueue_message(&self, username: &str, line: impl Into<String>) -> ChatResult<()> {
        self.accounts.write().await.enqueue(username, line)
    }

    /// Empties an account's queue, joining the lines with newlines.
    pub async fn drain_messages(&self, username: &str) -> String {
        self.accounts.write().await.drain(username).join("\n")
    }

    /// Returns the number of messages waiting for `username`.
    pub async fn pending_messages(&self, username: &str) -> usize {
        self.accounts
            .read()
            .await
            .get(username)
            .map_or(0, |account| account.pending())
    }

    // --- sessions ---

    /// Logs connection `id` in as `username`.
    pub async fn login(&self, username: &str, id: ConnectionId) -> ChatResult<()> {
        let accounts = self.accounts.read().await;
        if !accounts.contains(username) {
            return Err(ChatError::UnknownAccount {
                username: username.to_string(),
            });
        }
        self.registry.lock().await.bind(username, id)?;
        info!(username, conn_id = %id, "User logged in");
        Ok(())
    }

    /// Drops the session bound to connection `id`.
    pub async fn logout(&self, id: ConnectionId) -> Option<String> {
        self.registry.lock().await.logout_by_connection(id)
    }

    /// Returns true if `username` has a live session.
    pub async fn is_online(&self, username: &str) -> bool {
        self.registry.lock().await.is_online(username)
    }

    /// Returns the connection `username` is logged in on.
    pub async fn connection_for(&self, username: &str) -> Option<ClientHandle> {
        self.registry.lock().await.connection_for(username)
    }

    /// Returns the username logged in on connection `id`.
    pub async fn username_for(&self, id: ConnectionId) -> Option<String> {
        self.registry
            .lock()
            .await
            .username_for(id)
            .map(str::to_owned)
    }

    // --- messages ---

    /// Decides how to deliver `message`.
    ///
    /// The receiver's presence is checked and, if offline, the line queued in
    /// the same critical section, so a concurrent LOGIN cannot slip between
    /// the two.
    pub async fn route_message(&self, message: &ChatMessage) -> ChatResult<Delivery> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains(&message.receiver) {
            return Err(ChatError::ReceiverNotFound {
                username: message.receiver.clone(),
            });
        }

        if let Some(handle) = self.registry.lock().await.connection_for(&message.receiver) {
            return Ok(Delivery::Online(handle));
        }

        accounts.enqueue(&message.receiver, message.display_line())?;
        Ok(Delivery::Offline)
    }

    /// Drains the queue of whoever is logged in on connection `id`.
    pub async fn view_messages(&self, id: ConnectionId) -> ChatResult<String> {
        let mut accounts = self.accounts.write().await;
        let username = self
            .registry
            .lock()
            .await
            .username_for(id)
            .map(str::to_owned)
            .ok_or(ChatError::NotLoggedIn)?;
        Ok(accounts.drain(&username).join("\n"))
    }

    /// Drops all accounts, connections and sessions.
    pub async fn clear(&self) {
        let mut accounts = self.accounts.write().await;
        accounts.clear();
        self.registry.lock().await.drain();
    }
}
