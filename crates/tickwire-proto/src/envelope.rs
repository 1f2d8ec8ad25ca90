//! Sealed message bodies
//!
//! Two shapes, one per protocol variant. Field lengths are not enforced by
//! the serde layer; the codec checks them with [`crate::fixed_bytes`] before
//! any cryptographic work.

use serde::{Deserialize, Serialize};

/// Encrypted body of the session MAC variant.
///
/// `signature` covers `nonce || tag || ciphertext` and is checked before the
/// ciphertext is decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureEnvelope {
    /// AEAD nonce
    #[serde(with = "hex")]
    pub nonce: Vec<u8>,
    /// AEAD authentication tag
    #[serde(with = "hex")]
    pub tag: Vec<u8>,
    /// Encrypted payload
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
    /// MAC over the other three fields
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

impl SecureEnvelope {
    /// Bytes covered by the envelope signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        signed_bytes(&self.nonce, &self.tag, &self.ciphertext)
    }
}

/// Concatenate `nonce || tag || ciphertext` in signing order.
pub fn signed_bytes(nonce: &[u8], tag: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nonce.len() + tag.len() + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    out
}

/// Plaintext body of the signed, timestamped variant.
///
/// `payload` is the exact JSON text that was signed. Keeping it as a string
/// avoids re-serializing before verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    /// JSON text of the inner call object
    pub payload: String,
    /// Sender wall clock in milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Ed25519 signature over `payload || timestamp (u64 BE)`
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

impl SignedMessage {
    /// Bytes covered by the signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        timestamped_bytes(self.payload.as_bytes(), self.timestamp)
    }
}

/// Concatenate `payload || timestamp (u64 BE)` in signing order.
pub fn timestamped_bytes(payload: &[u8], timestamp: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(payload);
    out.extend_from_slice(&timestamp.to_be_bytes());
    out
}

/// Body produced by the channel codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SealedBody {
    /// Session MAC variant
    Envelope(SecureEnvelope),
    /// Signed timestamped variant
    Signed(SignedMessage),
}
