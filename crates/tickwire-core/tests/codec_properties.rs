//! Property-based tests for the channel codec
//!
//! Round-trip and single-bit tamper detection for both protocol variants,
//! plus ECDH symmetry through the full key exchange.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use tickwire_core::{
    ChannelCodec, DEFAULT_MAX_AGE, EndpointIdentity, Environment, ProtocolVariant,
    handshake::{ClientHandshake, accept_exchange},
};
use tickwire_crypto::{SessionKey, SigningKeyPair};
use tickwire_proto::{Body, SealedBody};

/// Fixed clock, OS randomness, no sleeping.
#[derive(Clone)]
struct FixedClock(u64);

impl Environment for FixedClock {
    fn wall_clock_ms(&self) -> u64 {
        self.0
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap();
    }
}

const NOW: u64 = 1_700_000_000_000;

fn codecs(variant: ProtocolVariant, key: [u8; 32]) -> (ChannelCodec, ChannelCodec) {
    let session = SessionKey::from_bytes(key);
    let a = Arc::new(SigningKeyPair::from_seed([1u8; 32]));
    let b = Arc::new(SigningKeyPair::from_seed([2u8; 32]));
    (
        ChannelCodec::new(variant, &session, a.clone(), b.public_key(), DEFAULT_MAX_AGE),
        ChannelCodec::new(variant, &session, b, a.public_key(), DEFAULT_MAX_AGE),
    )
}

fn variant_strategy() -> impl Strategy<Value = ProtocolVariant> {
    prop_oneof![Just(ProtocolVariant::SessionMac), Just(ProtocolVariant::SignedTimestamped)]
}

/// Flip bit `bit` of the concatenated wire fields of `body`.
fn flip_bit(body: &mut SealedBody, bit: usize) {
    let mut fields: Vec<&mut Vec<u8>> = match body {
        SealedBody::Envelope(e) => {
            vec![&mut e.nonce, &mut e.tag, &mut e.ciphertext, &mut e.signature]
        },
        SealedBody::Signed(m) => vec![&mut m.signature],
    };

    let total: usize = fields.iter().map(|f| f.len() * 8).sum();
    let mut index = bit % total;
    for field in &mut fields {
        if index < field.len() * 8 {
            field[index / 8] ^= 1 << (index % 8);
            return;
        }
        index -= field.len() * 8;
    }
}

proptest! {
    #[test]
    fn seal_open_roundtrip(
        variant in variant_strategy(),
        key in any::<[u8; 32]>(),
        payload in "[ -~]{0,256}",
    ) {
        let env = FixedClock(NOW);
        let (client, server) = codecs(variant, key);

        let body = client.seal(&payload, &env).unwrap();
        prop_assert_eq!(ProtocolVariant::of(&body), variant);
        prop_assert_eq!(server.open(&body, &env).unwrap(), payload);
    }

    #[test]
    fn single_bit_flip_is_detected(
        variant in variant_strategy(),
        key in any::<[u8; 32]>(),
        payload in "[ -~]{1,128}",
        bit in any::<usize>(),
    ) {
        let env = FixedClock(NOW);
        let (client, server) = codecs(variant, key);

        let mut body = client.seal(&payload, &env).unwrap();
        flip_bit(&mut body, bit);

        let err = server.open(&body, &env).unwrap_err();
        prop_assert!(err.is_forgery(), "unexpected error class: {err:?}");
    }

    #[test]
    fn signed_payload_or_timestamp_change_is_detected(
        payload in "[a-z]{1,64}",
        shift in 1u64..1_000,
    ) {
        let env = FixedClock(NOW);
        let (client, server) = codecs(ProtocolVariant::SignedTimestamped, [0u8; 32]);

        let SealedBody::Signed(original) = client.seal(&payload, &env).unwrap() else {
            unreachable!("signed variant seals messages");
        };

        let mut moved = original.clone();
        moved.timestamp -= shift;
        prop_assert!(server.open(&SealedBody::Signed(moved), &env).unwrap_err().is_forgery());

        let mut edited = original;
        edited.payload.push('x');
        prop_assert!(server.open(&SealedBody::Signed(edited), &env).unwrap_err().is_forgery());
    }

    #[test]
    fn exchange_is_symmetric(server_seed in any::<[u8; 32]>(), signing_seed in any::<[u8; 32]>()) {
        let env = FixedClock(NOW);
        let server = EndpointIdentity::from_seed(&server_seed);
        let mut client =
            ClientHandshake::new("c1", Arc::new(SigningKeyPair::from_seed(signing_seed)));

        client.generate_keys(&env).unwrap();
        let request = client.request().unwrap();
        let accepted = accept_exchange(&server, &request).unwrap();
        let body = Body::Plain(serde_json::to_value(&accepted.response).unwrap());
        let established = client.handle_response(&body).unwrap();

        prop_assert_eq!(established.session_key, accepted.session_key);
    }
}
