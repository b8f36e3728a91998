//! In-memory account directory with per-account offline queues.
//!
//! The store holds no lock of its own; [`ChatState`](crate::ChatState) wraps it
//! so every operation runs inside one critical section.

use std::collections::{BTreeMap, VecDeque};

use wirechat_core::GlobPattern;

use crate::error::{ChatError, ChatResult};

/// A registered username and the messages waiting for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    username: String,
    queue: VecDeque<String>,
}

impl Account {
    /// Creates an account with an empty queue.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            queue: VecDeque::new(),
        }
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the number of queued messages.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Appends a message to the back of the queue.
    pub fn push(&mut self, line: impl Into<String>) {
        self.queue.push_back(line.into());
    }

    /// Removes and returns every queued message, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.queue.drain(..).collect()
    }
}

/// Username → account map.
///
/// Backed by a `BTreeMap`, so listings come out sorted by username regardless
/// of creation order.
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: BTreeMap<String, Account>,
}

impl AccountStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns true if no accounts exist.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Returns true if `username` is registered.
    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    /// Returns the account for `username`.
    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    /// Registers a new username.
    pub fn create(&mut self, username: &str) -> ChatResult<()> {
        if username.is_empty() {
            return Err(ChatError::EmptyUsername);
        }
        if self.accounts.contains_key(username) {
            return Err(ChatError::DuplicateAccount {
                username: username.to_string(),
            });
        }
        self.accounts
            .insert(username.to_string(), Account::new(username));
        Ok(())
    }

    /// Removes an account together with its queue.
    pub fn remove(&mut self, username: &str) -> ChatResult<Account> {
        self.accounts
            .remove(username)
            .ok_or_else(|| ChatError::AccountNotFound {
                username: username.to_string(),
            })
    }

    /// Returns the usernames matching `pattern`, sorted.
    pub fn matching(&self, pattern: &GlobPattern) -> Vec<&str> {
        self.accounts
            .keys()
            .filter(|name| pattern.matches(name))
            .map(String::as_str)
            .collect()
    }

    /// Appends a message to an account's queue.
    pub fn enqueue(&mut self, username: &str, line: impl Into<String>) -> ChatResult<()> {
        let account =
            self.accounts
                .get_mut(username)
                .ok_or_else(|| ChatError::ReceiverNotFound {
                    username: username.to_string(),
                })?;
        account.push(line);
        Ok(())
    }

    /// Empties an account's queue, oldest first. Unknown usernames yield
    /// nothing.
    pub fn drain(&mut self, username: &str) -> Vec<String> {
        self.accounts
            .get_mut(username)
            .map(Account::drain)
            .unwrap_or_default()
    }

    /// Removes every account.
    pub fn clear(&mut self) {
        self.accounts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(names: &[&str]) -> AccountStore {
        let mut store = AccountStore::new();
        for name in names {
            store.create(name).unwrap();
        }
        store
    }

    #[test]
    fn create_then_duplicate() {
        let mut store = AccountStore::new();
        assert!(store.create("alice").is_ok());
        assert!(matches!(
            store.create("alice"),
            Err(ChatError::DuplicateAccount { ref username }) if username == "alice"
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_username_is_rejected() {
        let mut store = AccountStore::new();
        assert!(matches!(store.create(""), Err(ChatError::EmptyUsername)));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_unknown_account() {
        let mut store = AccountStore::new();
        assert!(matches!(
            store.remove("ghost"),
            Err(ChatError::AccountNotFound { .. })
        ));
    }

    #[test]
    fn remove_drops_queue() {
        let mut store = store_with(&["bob"]);
        store.enqueue("bob", "<alice>: hi").unwrap();

        let removed = store.remove("bob").unwrap();
        assert_eq!(removed.pending(), 1);

        store.create("bob").unwrap();
        assert_eq!(store.get("bob").unwrap().pending(), 0);
    }

    #[test]
    fn queue_is_fifo_and_drains_empty() {
        let mut store = store_with(&["bob"]);
        store.enqueue("bob", "first").unwrap();
        store.enqueue("bob", "second").unwrap();
        store.enqueue("bob", "third").unwrap();

        assert_eq!(store.drain("bob"), vec!["first", "second", "third"]);
        assert!(store.drain("bob").is_empty());
        assert!(store.drain("nobody").is_empty());
    }

    #[test]
    fn enqueue_requires_account() {
        let mut store = AccountStore::new();
        assert!(matches!(
            store.enqueue("ghost", "hello"),
            Err(ChatError::ReceiverNotFound { .. })
        ));
    }

    #[test]
    fn matching_is_sorted_and_exact() {
        let store = store_with(&["john", "bob", "jane", "Jim", "alice"]);

        let pattern = GlobPattern::new("j*").unwrap();
        assert_eq!(store.matching(&pattern), vec!["jane", "john"]);

        let pattern = GlobPattern::new("*").unwrap();
        assert_eq!(
            store.matching(&pattern),
            vec!["Jim", "alice", "bob", "jane", "john"]
        );

        let pattern = GlobPattern::new("z*").unwrap();
        assert!(store.matching(&pattern).is_empty());
    }
}
