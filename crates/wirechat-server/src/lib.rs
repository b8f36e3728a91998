//! Chat server: accounts, sessions, message routing.
//!
//! This crate provides the wirechat daemon that handles:
//! - TCP connections speaking the wirechat frame protocol
//! - An in-memory account directory with offline message queues
//! - Live sessions and push delivery to logged-in users
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! # Example
//!
//! ```rust,no_run
//! use wirechat_server::{ChatServer, ServerConfig, SignalHandler, make_connection_handler, new_shared_state};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = new_shared_state();
//!     let server = ChatServer::bind(ServerConfig::default(), state.clone()).await?;
//!
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     server
//!         .run_until_shutdown(make_connection_handler(state), signals.shutdown().wait())
//!         .await?;
//!     Ok(())
//! }
//! ```

mod accounts;
mod config;
mod error;
mod handler;
mod sessions;
mod signals;
mod socket;
mod state;

pub use accounts::{Account, AccountStore};
pub use config::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig};
pub use error::{ChatError, ChatResult, ServerError, ServerResult};
pub use handler::{Reply, RequestHandler, make_connection_handler};
pub use sessions::{BoxedWriter, ClientHandle, ConnectionId, Registry};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{BoxedReader, ChatServer, Connection, SHUTDOWN_MESSAGE};
pub use state::{ChatState, Delivery, SharedState, new_shared_state};
