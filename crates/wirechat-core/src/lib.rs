//! Core types: chat messages, glob matching, tracing setup

pub mod glob;
pub mod message;
pub mod tracing;

pub use glob::{GlobError, GlobPattern};
pub use message::{ChatMessage, MalformedMessage};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
