//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from cryptographic primitives.
///
/// Messages never include key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The entropy source failed while generating key material
    #[error("key generation failed: {0}")]
    KeyGen(String),

    /// The entropy source failed while drawing a nonce
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// Peer public key has the wrong length or is not a usable curve point
    #[error("invalid peer key: {reason}")]
    InvalidPeerKey {
        /// Why the key was rejected
        reason: String,
    },

    /// AEAD authentication tag did not verify
    #[error("authentication failed")]
    AuthFailure,

    /// Signature did not verify against the given public key
    #[error("bad signature")]
    BadSignature,
}

impl CryptoError {
    /// Returns true if the error means the input was forged or corrupted.
    ///
    /// Entropy failures are local faults and never attributed to the peer.
    pub fn is_forgery(&self) -> bool {
        matches!(self, Self::AuthFailure | Self::BadSignature | Self::InvalidPeerKey { .. })
    }
}
