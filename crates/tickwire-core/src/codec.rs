//! Secure channel codec.
//!
//! Wraps application payloads (JSON text of a [`tickwire_proto::CallRequest`]
//! or [`tickwire_proto::CallResponse`]) into sealed bodies and back. Two
//! protocol variants implement the same `seal`/`open` contract:
//!
//! ```text
//! SessionMac          payload ─AEAD(enc key)─▶ nonce, tag, ciphertext
//!                                                  │
//!                               HMAC(mac key) ◀────┘  ──▶ SecureEnvelope
//!
//! SignedTimestamped   payload ‖ timestamp ─Ed25519(own signing key)─▶ SignedMessage
//! ```
//!
//! # Security
//!
//! - `open` verifies the MAC or signature before anything else. Ciphertext is
//!   never decrypted under an unverified envelope.
//! - `SessionMac` has no freshness check; `SignedTimestamped` rejects
//!   messages older than the replay window.
//! - `SignedTimestamped` authenticates but does not encrypt.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tickwire_crypto::{
    AeadSealed, MAC_SIZE, NONCE_SIZE, SessionKey, SigningKeyPair, TAG_SIZE, aead_decrypt,
    aead_encrypt, derive_subkey, mac_sign, mac_verify, verify_signature,
};
use tickwire_proto::{SealedBody, SecureEnvelope, SignedMessage, fixed_bytes, signed_bytes};
use zeroize::Zeroize;

use crate::{
    env::{EnvRng, Environment},
    error::CodecError,
};

/// Default replay window for timestamped messages.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

const ENC_LABEL: &[u8] = b"enc";
const MAC_LABEL: &[u8] = b"mac";
const ASSOCIATED_DATA: &[u8] = b"tickwire-envelope-v1";

/// Which sealing scheme a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    /// AEAD ciphertext plus a session-derived HMAC
    #[default]
    SessionMac,
    /// Plaintext plus timestamp, signed with the endpoint's Ed25519 key
    SignedTimestamped,
}

impl ProtocolVariant {
    /// Variant a sealed body was produced with.
    pub fn of(body: &SealedBody) -> Self {
        match body {
            SealedBody::Envelope(_) => Self::SessionMac,
            SealedBody::Signed(_) => Self::SignedTimestamped,
        }
    }

    /// Configuration name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SessionMac => "session-mac",
            Self::SignedTimestamped => "signed-timestamped",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session-mac" => Ok(Self::SessionMac),
            "signed-timestamped" => Ok(Self::SignedTimestamped),
            other => Err(format!(
                "unknown protocol variant '{other}' (expected session-mac or signed-timestamped)"
            )),
        }
    }
}

/// `SessionMac` variant: encrypt-then-MAC under two HKDF sub-keys of the
/// session key.
pub struct MacCodec {
    enc_key: [u8; 32],
    mac_key: [u8; 32],
}

impl MacCodec {
    /// Derive the encryption and MAC sub-keys from `key`.
    pub fn new(key: &SessionKey) -> Self {
        Self { enc_key: derive_subkey(key, ENC_LABEL), mac_key: derive_subkey(key, MAC_LABEL) }
    }

    /// Encrypt `payload` under a fresh nonce and MAC the envelope fields.
    ///
    /// # Errors
    ///
    /// - `Seal` if the RNG fails
    pub fn seal<E: Environment>(&self, payload: &str, env: &E) -> Result<SecureEnvelope, CodecError> {
        let sealed =
            aead_encrypt(payload.as_bytes(), &self.enc_key, ASSOCIATED_DATA, &mut EnvRng(env))
                .map_err(|e| CodecError::Seal(e.to_string()))?;

        let signature = mac_sign(&signed_bytes(&sealed.nonce, &sealed.tag, &sealed.ciphertext), &self.mac_key);

        Ok(SecureEnvelope {
            nonce: sealed.nonce.to_vec(),
            tag: sealed.tag.to_vec(),
            ciphertext: sealed.ciphertext,
            signature: signature.to_vec(),
        })
    }

    /// Verify the MAC, then decrypt.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the MAC does not verify (checked first)
    /// - `Malformed` if nonce or tag have the wrong length, or the plaintext
    ///   is not UTF-8
    /// - `DecryptionFailed` if the AEAD tag does not verify
    pub fn open(&self, envelope: &SecureEnvelope) -> Result<String, CodecError> {
        if envelope.signature.len() != MAC_SIZE
            || !mac_verify(&envelope.signed_bytes(), &envelope.signature, &self.mac_key)
        {
            return Err(CodecError::InvalidSignature);
        }

        let sealed = AeadSealed {
            nonce: fixed_bytes::<NONCE_SIZE>("nonce", &envelope.nonce)?,
            ciphertext: envelope.ciphertext.clone(),
            tag: fixed_bytes::<TAG_SIZE>("tag", &envelope.tag)?,
        };

        let plaintext = aead_decrypt(&sealed, &self.enc_key, ASSOCIATED_DATA)
            .map_err(|_| CodecError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

impl Drop for MacCodec {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.mac_key.zeroize();
    }
}

/// `SignedTimestamped` variant: Ed25519 signature over payload and
/// timestamp, checked against the peer's verifying key.
pub struct SignedCodec {
    local: Arc<SigningKeyPair>,
    peer_signing_key: [u8; 32],
    max_age: Duration,
}

impl SignedCodec {
    /// Sign with `local`, verify against `peer_signing_key`.
    pub fn new(local: Arc<SigningKeyPair>, peer_signing_key: [u8; 32], max_age: Duration) -> Self {
        Self { local, peer_signing_key, max_age }
    }

    /// Stamp `payload` with the current wall clock and sign it.
    pub fn seal<E: Environment>(&self, payload: &str, env: &E) -> SignedMessage {
        let mut message = SignedMessage {
            payload: payload.to_string(),
            timestamp: env.wall_clock_ms(),
            signature: Vec::new(),
        };
        message.signature = self.local.sign(&message.signed_bytes()).to_vec();
        message
    }

    /// Verify the signature, then the replay window.
    ///
    /// Timestamps ahead of the local clock count as age zero.
    ///
    /// # Errors
    ///
    /// - `Unsigned` if the signature field is empty
    /// - `BadSignature` if the signature does not verify
    /// - `Expired` if `now - timestamp` exceeds the replay window
    pub fn open<E: Environment>(&self, message: &SignedMessage, env: &E) -> Result<String, CodecError> {
        if message.signature.is_empty() {
            return Err(CodecError::Unsigned);
        }

        verify_signature(&self.peer_signing_key, &message.signed_bytes(), &message.signature)
            .map_err(|_| CodecError::BadSignature)?;

        let age_ms = env.wall_clock_ms().saturating_sub(message.timestamp);
        let max_age_ms = self.max_age.as_millis() as u64;
        if age_ms > max_age_ms {
            return Err(CodecError::Expired { age_ms, max_age_ms });
        }

        Ok(message.payload.clone())
    }
}

/// Codec bound to one established session.
pub enum ChannelCodec {
    /// Encrypt-then-MAC
    SessionMac(MacCodec),
    /// Signed plaintext with replay window
    SignedTimestamped(SignedCodec),
}

impl ChannelCodec {
    /// Build the codec for `variant` from the session material.
    ///
    /// Both variants receive every input so the choice stays a pure
    /// configuration switch.
    pub fn new(
        variant: ProtocolVariant,
        session_key: &SessionKey,
        local_signing: Arc<SigningKeyPair>,
        peer_signing_key: [u8; 32],
        max_age: Duration,
    ) -> Self {
        match variant {
            ProtocolVariant::SessionMac => Self::SessionMac(MacCodec::new(session_key)),
            ProtocolVariant::SignedTimestamped => Self::SignedTimestamped(SignedCodec::new(
                local_signing,
                peer_signing_key,
                max_age,
            )),
        }
    }

    /// Variant implemented by this codec.
    pub fn variant(&self) -> ProtocolVariant {
        match self {
            Self::SessionMac(_) => ProtocolVariant::SessionMac,
            Self::SignedTimestamped(_) => ProtocolVariant::SignedTimestamped,
        }
    }

    /// Seal JSON text.
    ///
    /// # Errors
    ///
    /// - `Seal` on local entropy failure
    pub fn seal<E: Environment>(&self, payload: &str, env: &E) -> Result<SealedBody, CodecError> {
        match self {
            Self::SessionMac(codec) => codec.seal(payload, env).map(SealedBody::Envelope),
            Self::SignedTimestamped(codec) => Ok(SealedBody::Signed(codec.seal(payload, env))),
        }
    }

    /// Open a sealed body into JSON text.
    ///
    /// # Errors
    ///
    /// - `VariantMismatch` if `body` was sealed with the other variant
    /// - Any verification error of the matching variant
    pub fn open<E: Environment>(&self, body: &SealedBody, env: &E) -> Result<String, CodecError> {
        match (self, body) {
            (Self::SessionMac(codec), SealedBody::Envelope(envelope)) => codec.open(envelope),
            (Self::SignedTimestamped(codec), SealedBody::Signed(message)) => {
                codec.open(message, env)
            },
            _ => Err(CodecError::VariantMismatch {
                expected: self.variant(),
                actual: ProtocolVariant::of(body),
            }),
        }
    }

    /// Serialize `value` to JSON and seal it.
    ///
    /// # Errors
    ///
    /// - `Seal` if serialization or sealing fails
    pub fn seal_json<T: Serialize, E: Environment>(
        &self,
        value: &T,
        env: &E,
    ) -> Result<SealedBody, CodecError> {
        let json = serde_json::to_string(value).map_err(|e| CodecError::Seal(e.to_string()))?;
        self.seal(&json, env)
    }

    /// Open a sealed body and deserialize the JSON inside.
    ///
    /// # Errors
    ///
    /// - Any error of [`ChannelCodec::open`]
    /// - `Malformed` if the verified text is not the expected JSON shape
    pub fn open_json<T: DeserializeOwned, E: Environment>(
        &self,
        body: &SealedBody,
        env: &E,
    ) -> Result<T, CodecError> {
        let json = self.open(body, env)?;
        serde_json::from_str(&json).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

impl fmt::Debug for ChannelCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCodec").field("variant", &self.variant()).finish_non_exhaustive()
    }
}
