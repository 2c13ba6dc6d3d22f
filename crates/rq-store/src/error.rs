//! Error types for the RQ store layer.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while connecting to or reading from the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read password file {path}: {source}")]
    PasswordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect: {0}")]
    Connection(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// The entity vanished between enumeration and detail fetch.
    ///
    /// Callers skip the entity instead of aborting the whole cycle.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Configuration errors, including an unreadable password file.
    pub fn is_config(&self) -> bool {
        matches!(self, StoreError::Config(_) | StoreError::PasswordFile { .. })
    }
}
