//! Authenticated encryption using `XChaCha20-Poly1305`
//!
//! The tag is returned detached so the envelope can carry nonce, tag and
//! ciphertext as separate wire fields.

use chacha20poly1305::{
    Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use rand_core::CryptoRngCore;

use crate::error::CryptoError;

/// Size of the `XChaCha20` nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Output of [`aead_encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadSealed {
    /// Random nonce drawn for this message
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// Poly1305 authentication tag
    pub tag: [u8; TAG_SIZE],
}

/// Encrypt `plaintext` under `key`.
///
/// A 192-bit nonce is drawn from `rng` on every call. At that size random
/// nonces do not collide in practice, so no counter state is needed.
///
/// # Errors
///
/// - `Entropy` if the RNG fails
pub fn aead_encrypt(
    plaintext: &[u8],
    key: &[u8; 32],
    associated_data: &[u8],
    rng: &mut impl CryptoRngCore,
) -> Result<AeadSealed, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.try_fill_bytes(&mut nonce).map_err(|e| CryptoError::Entropy(e.to_string()))?;

    let cipher = XChaCha20Poly1305::new(key.into());
    let mut buffer = plaintext.to_vec();

    let Ok(tag) =
        cipher.encrypt_in_place_detached(XNonce::from_slice(&nonce), associated_data, &mut buffer)
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail below the 256 GiB message limit");
    };

    Ok(AeadSealed { nonce, ciphertext: buffer, tag: tag.into() })
}

/// Decrypt and authenticate `sealed` under `key`.
///
/// # Errors
///
/// - `AuthFailure` if the tag, nonce, ciphertext, associated data or key do
///   not match
pub fn aead_decrypt(
    sealed: &AeadSealed,
    key: &[u8; 32],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut buffer = sealed.ciphertext.clone();

    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(&sealed.nonce),
            associated_data,
            &mut buffer,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| CryptoError::AuthFailure)?;

    Ok(buffer)
}
