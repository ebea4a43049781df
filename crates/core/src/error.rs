//! Error types for WatchSync Core

use thiserror::Error;

/// Result type alias for WatchSync Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the session store and its callers
#[derive(Debug, Error)]
pub enum Error {
    /// No session document exists for the given id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A session document already exists for the given id
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// Session id failed validation (e.g. not path-safe)
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Store backend failure (lock acquisition, corrupt document, ...)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
