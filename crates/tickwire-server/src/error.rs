//! Server error types.

use std::fmt;

use tickwire_core::TransportError;

use crate::storage::StorageError;

/// Errors that stop the server from starting or running.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable TLS files, etc.).
    ///
    /// Fatal. Fix configuration and restart.
    Config(String),

    /// Transport error (bind failure, endpoint closed).
    ///
    /// May be transient (network issues) or fatal (address in use).
    Transport(String),

    /// Storage backend failed.
    ///
    /// See `StorageError` for details.
    Storage(StorageError),

    /// Persisted identity is inconsistent.
    ///
    /// The stored public key does not match the stored seed, or a seed has
    /// the wrong length. Fatal: the store must be repaired or replaced.
    Identity(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Identity(msg) => write!(f, "identity error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<TransportError> for ServerError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
