//! Endpoint identity keys
//!
//! An identity is one agreement pair plus one signing pair. Servers derive
//! both from a persisted 32-byte seed so their public keys survive restarts;
//! clients generate a fresh identity per process.

use std::{fmt, sync::Arc};

use tickwire_crypto::{AgreementKeyPair, PUBLIC_KEY_SIZE, SigningKeyPair, derive_key};
use zeroize::Zeroize;

use crate::env::Environment;

const AGREEMENT_LABEL: &[u8] = b"tickwire identity agreement";
const SIGNING_LABEL: &[u8] = b"tickwire identity signing";

/// Long-lived key material of one endpoint.
pub struct EndpointIdentity {
    agreement: AgreementKeyPair,
    signing: Arc<SigningKeyPair>,
}

impl EndpointIdentity {
    /// Derive both key pairs from `seed`.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut agreement_seed = derive_key(seed, AGREEMENT_LABEL);
        let mut signing_seed = derive_key(seed, SIGNING_LABEL);

        let identity = Self {
            agreement: AgreementKeyPair::from_seed(agreement_seed),
            signing: Arc::new(SigningKeyPair::from_seed(signing_seed)),
        };

        agreement_seed.zeroize();
        signing_seed.zeroize();
        identity
    }

    /// Generate a fresh identity from the environment RNG.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut seed = [0u8; 32];
        env.random_bytes(&mut seed);
        let identity = Self::from_seed(&seed);
        seed.zeroize();
        identity
    }

    /// Agreement key pair used to answer key exchanges.
    pub fn agreement(&self) -> &AgreementKeyPair {
        &self.agreement
    }

    /// Signing key pair shared with every session codec.
    pub fn signing(&self) -> &Arc<SigningKeyPair> {
        &self.signing
    }

    /// Agreement public key.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.agreement.public_key()
    }

    /// Ed25519 verifying key.
    pub fn signing_public_key(&self) -> [u8; 32] {
        self.signing.public_key()
    }
}

impl fmt::Debug for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointIdentity")
            .field("public_key", &self.public_key())
            .field("signing_public_key", &self.signing_public_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingEnv;

    #[test]
    fn same_seed_same_identity() {
        let a = EndpointIdentity::from_seed(&[7u8; 32]);
        let b = EndpointIdentity::from_seed(&[7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.signing_public_key(), b.signing_public_key());
    }

    #[test]
    fn agreement_and_signing_keys_are_independent() {
        let identity = EndpointIdentity::from_seed(&[7u8; 32]);
        assert_ne!(identity.public_key(), identity.signing_public_key());
    }

    #[test]
    fn generated_identities_differ() {
        let env = RecordingEnv::default();
        let a = EndpointIdentity::generate(&env);
        let b = EndpointIdentity::generate(&env);
        assert_ne!(a.public_key(), b.public_key());
    }
}
