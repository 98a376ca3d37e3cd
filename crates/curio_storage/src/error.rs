//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is empty, absolute, or escapes the store root.
    #[error("invalid document key: {0:?}")]
    InvalidKey(String),

    /// Another process holds the data directory lock.
    #[error("data directory is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// A document could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
