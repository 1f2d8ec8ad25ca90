//! Tickwire Cryptographic Primitives
//!
//! Stateless building blocks for the tickwire session protocol. Every
//! function that needs randomness takes the RNG as a parameter, so tests can
//! drive them with a seeded generator while production passes the OS RNG.
//!
//! # Key Lifecycle
//!
//! ```text
//! X25519 (own secret, peer public)
//!        │
//!        ▼
//! SHA-256 → Session Key (per handshake, per client)
//!        │
//!        ├── HKDF "enc" → XChaCha20-Poly1305 key
//!        │
//!        └── HKDF "mac" → HMAC-SHA256 key
//! ```
//!
//! Endpoint identities additionally hold an Ed25519 signing pair, used by the
//! timestamped signature variant of the channel codec.
//!
//! # Security
//!
//! - Nonces are drawn from the RNG inside [`aead_encrypt`]; callers cannot
//!   supply one, so a nonce is never reused under the same key.
//! - MAC and signature verification compare in constant time.
//! - Session keys are zeroized on drop and never implement `Serialize`.
//! - The shared secret is rejected when the peer key is a low-order point
//!   (non-contributory exchange).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aead;
mod agreement;
mod error;
mod mac;
mod signing;

pub use aead::{AeadSealed, NONCE_SIZE, TAG_SIZE, aead_decrypt, aead_encrypt};
pub use agreement::{AgreementKeyPair, PUBLIC_KEY_SIZE, SESSION_KEY_SIZE, SessionKey};
pub use error::CryptoError;
pub use mac::{MAC_SIZE, constant_time_eq, derive_key, derive_subkey, mac_sign, mac_verify};
pub use signing::{SIGNATURE_SIZE, SigningKeyPair, verify_signature};
