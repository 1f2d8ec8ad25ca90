//! HMAC-SHA256 message authentication and sub-key derivation

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::agreement::SessionKey;

type HmacSha256 = Hmac<Sha256>;

/// Size of an HMAC-SHA256 tag in bytes
pub const MAC_SIZE: usize = 32;

/// Compute HMAC-SHA256 of `data` under `key`.
pub fn mac_sign(data: &[u8], key: &[u8; 32]) -> [u8; MAC_SIZE] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify an HMAC-SHA256 `tag` over `data` in constant time.
pub fn mac_verify(data: &[u8], tag: &[u8], key: &[u8; 32]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// Compare two byte strings without data-dependent early exit.
///
/// Slices of different length compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Derive a labelled 32-byte sub-key from a session key using HKDF-SHA256.
///
/// Distinct labels yield independent keys, so encryption and MAC never share
/// key material.
pub fn derive_subkey(key: &SessionKey, label: &[u8]) -> [u8; 32] {
    derive_key(key.as_bytes(), label)
}

/// Derive a labelled 32-byte key from arbitrary 32-byte input keying
/// material (for example a persisted identity seed).
pub fn derive_key(ikm: &[u8; 32], label: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);

    let mut out = [0u8; 32];
    let Ok(()) = hkdf.expand(label, &mut out) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    out
}
