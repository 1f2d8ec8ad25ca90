//! Ed25519 endpoint signing keys

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 signing pair owned by one endpoint identity.
pub struct SigningKeyPair {
    key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a fresh signing pair.
    ///
    /// # Errors
    ///
    /// - `KeyGen` if the RNG cannot produce entropy
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        rng.try_fill_bytes(&mut seed).map_err(|e| CryptoError::KeyGen(e.to_string()))?;
        let pair = Self::from_seed(seed);
        seed.zeroize();
        Ok(pair)
    }

    /// Rebuild a signing pair from persisted seed bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { key: SigningKey::from_bytes(&seed) }
    }

    /// Verifying key bytes to hand to the peer.
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Sign `data`.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.key.sign(data).to_bytes()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair").field("public", &self.public_key()).finish()
    }
}

/// Verify an Ed25519 `signature` over `data`.
///
/// Uses strict verification (rejects malleable and small-order signatures).
///
/// # Errors
///
/// - `InvalidPeerKey` if `public_key` is not a valid Ed25519 point
/// - `BadSignature` if the signature is malformed or does not verify
pub fn verify_signature(
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let bytes: [u8; 32] = public_key.try_into().map_err(|_| CryptoError::InvalidPeerKey {
        reason: format!("expected 32 byte verifying key, got {}", public_key.len()),
    })?;
    let verifying = VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPeerKey {
        reason: "not an Ed25519 point".to_string(),
    })?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::BadSignature)?;

    verifying.verify_strict(data, &signature).map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use rand_core::{CryptoRng, RngCore};

    use super::*;

    /// RNG whose entropy source is gone.
    struct DeadRng;

    impl RngCore for DeadRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand_core::Error> {
            Err(NonZeroU32::new(rand_core::Error::CUSTOM_START).unwrap().into())
        }
    }

    impl CryptoRng for DeadRng {}

    #[test]
    fn failing_rng_is_keygen_error() {
        assert!(matches!(SigningKeyPair::generate(&mut DeadRng), Err(CryptoError::KeyGen(_))));
    }

    #[test]
    fn sign_verify_roundtrip() {
        let pair = SigningKeyPair::from_seed([9u8; 32]);
        let signature = pair.sign(b"payload");
        assert!(verify_signature(&pair.public_key(), b"payload", &signature).is_ok());
    }

    #[test]
    fn verify_rejects_other_data() {
        let pair = SigningKeyPair::from_seed([9u8; 32]);
        let signature = pair.sign(b"payload");
        assert_eq!(
            verify_signature(&pair.public_key(), b"payload!", &signature),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn verify_rejects_other_key() {
        let signer = SigningKeyPair::from_seed([9u8; 32]);
        let other = SigningKeyPair::from_seed([10u8; 32]);
        let signature = signer.sign(b"payload");
        assert_eq!(
            verify_signature(&other.public_key(), b"payload", &signature),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn verify_rejects_truncated_signature() {
        let pair = SigningKeyPair::from_seed([9u8; 32]);
        let signature = pair.sign(b"payload");
        assert_eq!(
            verify_signature(&pair.public_key(), b"payload", &signature[..63]),
            Err(CryptoError::BadSignature)
        );
    }
}
