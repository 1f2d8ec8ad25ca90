//! Client error types.

use std::time::Duration;

use thiserror::Error;
use tickwire_core::{HandshakeError, TransportError};

/// Errors from client operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Key exchange failed or was rejected
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Connection could not be opened or broke
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No response within the call timeout. The server may still answer;
    /// that late answer is discarded.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Response failed verification or has the wrong shape
    #[error("invalid server response: {0}")]
    InvalidServerResponse(String),

    /// Server answered with an error or a rejection
    #[error("server error: {0}")]
    Remote(String),

    /// Every connection attempt failed
    #[error("connect failed after {attempts} attempts: {last}")]
    ConnectFailed {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: Box<ClientError>,
    },

    /// `call` before a successful `connect`
    #[error("not connected")]
    NotConnected,

    /// Request could not be serialized or sealed
    #[error("encode error: {0}")]
    Encode(String),
}

impl ClientError {
    /// Returns true if the error came from the server rather than the link.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Returns true if a fresh connection attempt may succeed.
    ///
    /// Key generation failures and handshake state violations are local
    /// faults; so are encoding failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Handshake(e) => e.is_retryable(),
            Self::Encode(_) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failed_names_attempts_and_cause() {
        let err = ClientError::ConnectFailed {
            attempts: 2,
            last: Box::new(TransportError::Connection("refused".into()).into()),
        };
        assert_eq!(
            err.to_string(),
            "connect failed after 2 attempts: transport error: connection failed: refused"
        );
    }

    #[test]
    fn local_faults_are_not_retryable() {
        assert!(!ClientError::Handshake(HandshakeError::KeyGen("no entropy".into())).is_retryable());
        assert!(!ClientError::Encode("bad".into()).is_retryable());
        assert!(ClientError::Handshake(HandshakeError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(ClientError::Transport(TransportError::Closed).is_retryable());
    }
}
