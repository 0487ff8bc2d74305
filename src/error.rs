//! Error types for script and snapshot decoding.
//!
//! Collection mutations never fail; these errors only surface at the
//! transport boundary, before anything is mutated.

use thiserror::Error;

/// Main error type for decoding and compiling deltas.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    #[error("Not a collection: {0}")]
    NotACollection(String),

    #[error("Invalid target path: {0}")]
    InvalidPath(String),

    #[error("Nesting deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("Invalid record id: {0}")]
    InvalidRecordId(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Deserialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SyncError::Deserialization(e.to_string())
    }
}

/// Result type for decoding operations.
pub type Result<T> = std::result::Result<T, SyncError>;
