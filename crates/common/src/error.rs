//! Common error types for the federation monitor.

use std::fmt;

/// A specialized Result type for federation monitor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort startup or a long-running task.
///
/// Per-server and per-group failures never reach this type; they are
/// recorded on the status tree instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chat client error: {0}")]
    Client(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new chat client error.
    pub fn client(msg: impl fmt::Display) -> Self {
        Error::Client(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}
