//! Error types for podclock-core

use thiserror::Error;

/// Main error type for the podclock-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (network, HTTP status, non-JSON body)
    #[error("remote error: {0}")]
    Remote(String),

    /// Request exceeded the hard network timeout
    #[error("SYNC_TIMEOUT: remote did not answer in time")]
    SyncTimeout,

    /// Remote is in maintenance mode and refuses writes
    #[error("MAINTENANCE_ACTIVE: remote is in maintenance mode")]
    Maintenance,

    /// Registration collided with an existing nickname
    #[error("NICKNAME_TAKEN: nickname {0} is already registered")]
    NicknameTaken(String),

    /// Remote answered with `success: false` and some other code
    #[error("remote rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Pod not found
    #[error("pod not found: {0}")]
    PodNotFound(String),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Operation needs an account but the vault has none
    #[error("vault has no registered account")]
    NotRegistered,

    /// Rejected user input
    #[error("invalid input: {0}")]
    Validation(String),
}

impl Error {
    /// Whether the next sync cycle may succeed where this one failed.
    ///
    /// Maintenance is excluded: it flips a global mode instead of retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Remote(_) | Error::SyncTimeout | Error::Rejected { .. }
        )
    }
}

/// Result type alias for podclock-core
pub type Result<T> = std::result::Result<T, Error>;
