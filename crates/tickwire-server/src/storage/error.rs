//! Storage error types.

use thiserror::Error;

/// Errors from the time-indexed store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A point already exists at this (symbol, timestamp)
    #[error("duplicate key: {symbol} at {timestamp}")]
    DuplicateKey {
        /// Symbol of the rejected point
        symbol: String,
        /// Timestamp of the rejected point
        timestamp: u64,
    },

    /// No point stored for the symbol
    #[error("not found: {0}")]
    NotFound(String),

    /// Symbol is empty or contains the key separator
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend I/O failure
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Returns true if the backend itself is unusable.
    ///
    /// Duplicate, missing and invalid keys are caller mistakes; the store
    /// remains healthy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
