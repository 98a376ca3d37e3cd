//! Error types for the sync engine.

use curio_storage::StorageError;
use curio_sync_protocol::{ProtocolError, RecordId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// None of these reach the engine's callers: the engine logs them and
/// either stays local-only or waits for the next sync trigger.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote backend is unreachable or not authenticated.
    #[error("remote backend unavailable")]
    Unavailable,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried on a later tick.
        retryable: bool,
    },

    /// The backend asked the client to slow down.
    #[error("rate limited")]
    RateLimited,

    /// The zone is busy with another writer.
    #[error("zone {0} is busy")]
    ZoneBusy(String),

    /// The zone has not been created.
    #[error("zone {0} not found")]
    ZoneNotFound(String),

    /// The record was modified by another device since it was read.
    #[error("record {0} was modified concurrently")]
    Conflict(RecordId),

    /// The record does not exist.
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// Local storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Snapshot or record codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error should be deferred to the next sync tick
    /// rather than abandoned.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::RateLimited | SyncError::ZoneBusy(_) | SyncError::Conflict(_) => true,
            SyncError::Unavailable => true,
            _ => false,
        }
    }
}
