//! X25519 key agreement and session key derivation

use std::fmt;

use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a derived session key in bytes
pub const SESSION_KEY_SIZE: usize = 32;

/// Symmetric secret shared by exactly one client and the server.
///
/// Derived as `SHA-256(X25519(own_secret, peer_public))`. Hashing fixes the
/// length for the AEAD cipher and removes the algebraic structure of the raw
/// curve point.
///
/// # Security
///
/// - Zeroized on drop
/// - Equality is constant time
/// - `Debug` never prints the key
#[derive(Clone)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes.
    ///
    /// Only tests and sub-key derivation should need this; production keys
    /// come from [`AgreementKeyPair::derive_shared_secret`].
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// X25519 key-agreement pair owned by one endpoint identity.
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl AgreementKeyPair {
    /// Generate a fresh key pair from the given RNG.
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

    /// Rebuild a key pair from persisted secret bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half, safe to send to the peer.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Compute the session key shared with `peer_public`.
    ///
    /// Symmetric: `a.derive_shared_secret(b.public)` equals
    /// `b.derive_shared_secret(a.public)`.
    ///
    /// # Errors
    ///
    /// - `InvalidPeerKey` if the key is not 32 bytes or is a low-order point
    pub fn derive_shared_secret(&self, peer_public: &[u8]) -> Result<SessionKey, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            peer_public.try_into().map_err(|_| CryptoError::InvalidPeerKey {
                reason: format!("expected {PUBLIC_KEY_SIZE} bytes, got {}", peer_public.len()),
            })?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(bytes));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPeerKey { reason: "low-order point".to_string() });
        }

        let digest: [u8; SESSION_KEY_SIZE] = Sha256::digest(shared.as_bytes()).into();
        Ok(SessionKey(digest))
    }
}

impl fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeyPair").field("public", &self.public.as_bytes()).finish()
    }
}
