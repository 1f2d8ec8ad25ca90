//! Error types for the tickwire protocol core.
//!
//! Separate enums per layer: the channel codec (verification failures),
//! the key exchange (state machine and peer faults) and the transport
//! collaborator (network failures). None of them carry key material, but
//! codec errors are still never forwarded to a peer verbatim.

use std::time::Duration;

use thiserror::Error;
use tickwire_crypto::CryptoError;
use tickwire_proto::ProtocolError;

use crate::{codec::ProtocolVariant, handshake::HandshakeState};

/// Errors from sealing or opening a message body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Envelope MAC did not verify
    #[error("invalid envelope signature")]
    InvalidSignature,

    /// AEAD tag did not verify after the MAC passed
    #[error("decryption failed")]
    DecryptionFailed,

    /// Timestamped message is older than the replay window
    #[error("message expired: age {age_ms}ms exceeds {max_age_ms}ms")]
    Expired {
        /// Observed age
        age_ms: u64,
        /// Configured replay window
        max_age_ms: u64,
    },

    /// Timestamped message carries no signature
    #[error("message is unsigned")]
    Unsigned,

    /// Timestamped message signature did not verify
    #[error("bad message signature")]
    BadSignature,

    /// Body was sealed with the other protocol variant
    #[error("variant mismatch: expected {expected:?}, got {actual:?}")]
    VariantMismatch {
        /// Variant this codec implements
        expected: ProtocolVariant,
        /// Variant found on the wire
        actual: ProtocolVariant,
    },

    /// Field lengths, UTF-8 or inner JSON are malformed
    #[error("malformed body: {0}")]
    Malformed(String),

    /// Local failure while sealing (entropy, serialization)
    #[error("seal failed: {0}")]
    Seal(String),
}

impl CodecError {
    /// Returns true if the message was rejected only for being stale.
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// Returns true if the body was forged, tampered with or sent under the
    /// wrong key.
    pub fn is_forgery(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::DecryptionFailed
                | Self::Unsigned
                | Self::BadSignature
                | Self::VariantMismatch { .. }
        )
    }
}

impl From<ProtocolError> for CodecError {
    fn from(err: ProtocolError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors from the session key exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Peer public key has the wrong length or is a low-order point
    #[error("malformed peer key: {0}")]
    MalformedPeerKey(String),

    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: HandshakeState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Peer answered with an explicit error or rejection
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// Peer did not answer in time
    #[error("handshake timeout after {0:?}")]
    Timeout(Duration),

    /// Underlying transport failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Entropy source failed while generating the agreement key pair
    #[error("key generation failed: {0}")]
    KeyGen(String),
}

impl HandshakeError {
    /// Returns true if a fresh handshake attempt may succeed.
    ///
    /// Key generation failure means the entropy source is gone; retrying
    /// cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::KeyGen(_) | Self::InvalidState { .. })
    }
}

impl From<CryptoError> for HandshakeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyGen(reason) | CryptoError::Entropy(reason) => Self::KeyGen(reason),
            other => Self::MalformedPeerKey(other.to_string()),
        }
    }
}

/// Errors from the transport and discovery collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish a connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection or listener is closed
    #[error("connection closed")]
    Closed,

    /// Reading or writing a stream failed
    #[error("stream error: {0}")]
    Stream(String),

    /// Topic lookup or announcement failed
    #[error("discovery failed: {0}")]
    Discovery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_classes() {
        assert!(CodecError::Expired { age_ms: 2, max_age_ms: 1 }.is_replay());
        assert!(!CodecError::Expired { age_ms: 2, max_age_ms: 1 }.is_forgery());
        assert!(CodecError::InvalidSignature.is_forgery());
        assert!(CodecError::Unsigned.is_forgery());
        assert!(!CodecError::Malformed("x".into()).is_forgery());
    }

    #[test]
    fn crypto_errors_map_to_handshake_errors() {
        let low_order = CryptoError::InvalidPeerKey { reason: "low order".into() };
        assert!(matches!(HandshakeError::from(low_order), HandshakeError::MalformedPeerKey(_)));
        assert_eq!(
            HandshakeError::from(CryptoError::KeyGen("no entropy".into())),
            HandshakeError::KeyGen("no entropy".into())
        );
        assert!(!HandshakeError::KeyGen(String::new()).is_retryable());
        assert!(HandshakeError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
