//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding snapshots and records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record lacks a required field.
    #[error("record {record} is missing field {field}")]
    MissingField {
        /// Record name.
        record: String,
        /// Field name.
        field: &'static str,
    },

    /// A record of the wrong kind was decoded.
    #[error("expected {expected} record, found {found}")]
    WrongKind {
        /// Expected record type.
        expected: &'static str,
        /// Record type actually found.
        found: &'static str,
    },
}
