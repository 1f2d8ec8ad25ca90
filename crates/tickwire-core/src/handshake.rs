//! Session key exchange.
//!
//! Sans-IO: the client state machine produces the request payload and
//! consumes the response body; the driver moves them over the transport and
//! reports timeouts or transport failures back through [`ClientHandshake::fail`].
//!
//! # State Machine (client)
//!
//! ```text
//! ┌──────┐ generate_keys ┌───────────────┐ request ┌───────────────┐
//! │ Idle │──────────────>│ KeysGenerated │────────>│ HandshakeSent │
//! └──────┘               └───────────────┘         └───────────────┘
//!                                                     │         │
//!                                     handle_response │         │ error / timeout
//!                                                     ↓         ↓
//!                                          ┌─────────────┐  ┌────────┐
//!                                          │ Established │  │ Failed │
//!                                          └─────────────┘  └────────┘
//! ```
//!
//! # Security
//!
//! The exchange is not authenticated: public keys travel unsigned, so
//! whoever answers at the transport address becomes the session peer.

use std::sync::Arc;

use tickwire_crypto::{AgreementKeyPair, PUBLIC_KEY_SIZE, SessionKey, SigningKeyPair};
use tickwire_proto::{
    Body, fixed_bytes,
    payloads::{ErrorPayload, ExchangeKeysRequest, ExchangeKeysResponse},
};

use crate::{
    env::{EnvRng, Environment},
    error::HandshakeError,
    identity::EndpointIdentity,
};

/// Client handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing generated yet
    Idle,
    /// Ephemeral agreement pair generated
    KeysGenerated,
    /// Request handed to the driver, waiting for the response
    HandshakeSent,
    /// Session key derived
    Established,
    /// Exchange failed; start a new handshake to retry
    Failed,
}

/// Session material held by the client once established.
#[derive(Debug)]
pub struct EstablishedSession {
    /// Derived symmetric key
    pub session_key: SessionKey,
    /// Server agreement public key
    pub server_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Server Ed25519 verifying key
    pub server_signing_key: [u8; 32],
}

/// Client side of the key exchange.
pub struct ClientHandshake {
    state: HandshakeState,
    client_id: String,
    signing: Arc<SigningKeyPair>,
    agreement: Option<AgreementKeyPair>,
}

impl ClientHandshake {
    /// Start a handshake for `client_id`.
    pub fn new(client_id: impl Into<String>, signing: Arc<SigningKeyPair>) -> Self {
        Self { state: HandshakeState::Idle, client_id: client_id.into(), signing, agreement: None }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Generate the ephemeral agreement pair.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless `Idle`
    /// - `KeyGen` if the entropy source fails (state becomes `Failed`)
    pub fn generate_keys<E: Environment>(&mut self, env: &E) -> Result<(), HandshakeError> {
        self.expect_state(HandshakeState::Idle, "generate keys")?;

        match AgreementKeyPair::generate(&mut EnvRng(env)) {
            Ok(pair) => {
                self.agreement = Some(pair);
                self.state = HandshakeState::KeysGenerated;
                Ok(())
            },
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Build the `exchangeKeys` payload and move to `HandshakeSent`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless `KeysGenerated`
    pub fn request(&mut self) -> Result<ExchangeKeysRequest, HandshakeError> {
        self.expect_state(HandshakeState::KeysGenerated, "send request")?;
        let Some(agreement) = &self.agreement else {
            return Err(self.invalid("send request"));
        };

        let request = ExchangeKeysRequest {
            client_id: self.client_id.clone(),
            client_public_key: agreement.public_key().to_vec(),
            signing_public_key: self.signing.public_key().to_vec(),
        };
        self.state = HandshakeState::HandshakeSent;
        Ok(request)
    }

    /// Consume the server's response body and derive the session key.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless `HandshakeSent`
    /// - `Rejected` if the server returned an error or rejection
    /// - `MalformedPeerKey` if the server keys are unusable
    ///
    /// Every error except `InvalidState` moves the state to `Failed`.
    pub fn handle_response(&mut self, body: &Body) -> Result<EstablishedSession, HandshakeError> {
        self.expect_state(HandshakeState::HandshakeSent, "handle response")?;

        match self.derive(body) {
            Ok(session) => {
                self.agreement = None;
                self.state = HandshakeState::Established;
                Ok(session)
            },
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Record a failure reported by the driver (timeout, transport error).
    ///
    /// Returns the error for convenient propagation.
    pub fn fail(&mut self, error: HandshakeError) -> HandshakeError {
        tracing::debug!(client_id = %self.client_id, from = ?self.state, %error, "handshake failed");
        self.agreement = None;
        self.state = HandshakeState::Failed;
        error
    }

    fn derive(&self, body: &Body) -> Result<EstablishedSession, HandshakeError> {
        let value = match body {
            Body::Plain(value) => value,
            Body::Rejected(reason) => return Err(HandshakeError::Rejected(reason.clone())),
            Body::Sealed(_) => {
                return Err(HandshakeError::Rejected("unexpected sealed response".to_string()));
            },
        };

        if let Ok(error) = serde_json::from_value::<ErrorPayload>(value.clone()) {
            return Err(HandshakeError::Rejected(error.error));
        }

        let response: ExchangeKeysResponse = serde_json::from_value(value.clone())
            .map_err(|e| HandshakeError::MalformedPeerKey(format!("invalid response: {e}")))?;

        let server_signing_key = fixed_bytes::<32>("signingPublicKey", &response.signing_public_key)
            .map_err(|e| HandshakeError::MalformedPeerKey(e.to_string()))?;
        let server_public_key =
            fixed_bytes::<PUBLIC_KEY_SIZE>("serverPublicKey", &response.server_public_key)
                .map_err(|e| HandshakeError::MalformedPeerKey(e.to_string()))?;

        let Some(agreement) = &self.agreement else {
            return Err(self.invalid("derive session key"));
        };
        let session_key = agreement.derive_shared_secret(&server_public_key)?;

        Ok(EstablishedSession { session_key, server_public_key, server_signing_key })
    }

    fn expect_state(
        &self,
        expected: HandshakeState,
        operation: &'static str,
    ) -> Result<(), HandshakeError> {
        if self.state == expected { Ok(()) } else { Err(self.invalid(operation)) }
    }

    fn invalid(&self, operation: &'static str) -> HandshakeError {
        HandshakeError::InvalidState { state: self.state, operation }
    }
}

/// Server side result of a successful exchange.
#[derive(Debug)]
pub struct AcceptedExchange {
    /// Derived symmetric key for the client
    pub session_key: SessionKey,
    /// Client agreement public key
    pub client_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Client Ed25519 verifying key
    pub client_signing_key: [u8; 32],
    /// Payload to return to the client
    pub response: ExchangeKeysResponse,
}

/// Answer an `exchangeKeys` request with the server identity.
///
/// # Errors
///
/// - `MalformedPeerKey` if either client key has the wrong length or the
///   agreement key is a low-order point
pub fn accept_exchange(
    identity: &EndpointIdentity,
    request: &ExchangeKeysRequest,
) -> Result<AcceptedExchange, HandshakeError> {
    let client_public_key =
        fixed_bytes::<PUBLIC_KEY_SIZE>("clientPublicKey", &request.client_public_key)
            .map_err(|e| HandshakeError::MalformedPeerKey(e.to_string()))?;
    let client_signing_key = fixed_bytes::<32>("signingPublicKey", &request.signing_public_key)
        .map_err(|e| HandshakeError::MalformedPeerKey(e.to_string()))?;

    let session_key = identity.agreement().derive_shared_secret(&client_public_key)?;

    Ok(AcceptedExchange {
        session_key,
        client_public_key,
        client_signing_key,
        response: ExchangeKeysResponse {
            server_public_key: identity.public_key().to_vec(),
            signing_public_key: identity.signing_public_key().to_vec(),
        },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::RecordingEnv;

    fn client() -> ClientHandshake {
        ClientHandshake::new("c1", Arc::new(SigningKeyPair::from_seed([1u8; 32])))
    }

    fn response_body(response: &ExchangeKeysResponse) -> Body {
        Body::Plain(serde_json::to_value(response).unwrap())
    }

    #[test]
    fn full_exchange_derives_same_key() {
        let env = RecordingEnv::default();
        let server = EndpointIdentity::from_seed(&[2u8; 32]);
        let mut handshake = client();

        handshake.generate_keys(&env).unwrap();
        assert_eq!(handshake.state(), HandshakeState::KeysGenerated);

        let request = handshake.request().unwrap();
        assert_eq!(handshake.state(), HandshakeState::HandshakeSent);
        assert_eq!(request.client_id, "c1");

        let accepted = accept_exchange(&server, &request).unwrap();
        let session = handshake.handle_response(&response_body(&accepted.response)).unwrap();

        assert_eq!(handshake.state(), HandshakeState::Established);
        assert_eq!(session.session_key, accepted.session_key);
        assert_eq!(session.server_public_key, server.public_key());
        assert_eq!(session.server_signing_key, server.signing_public_key());
    }

    #[test]
    fn out_of_order_calls_are_invalid() {
        let mut handshake = client();
        assert!(matches!(
            handshake.request(),
            Err(HandshakeError::InvalidState { state: HandshakeState::Idle, .. })
        ));
        assert!(matches!(
            handshake.handle_response(&Body::Plain(json!({}))),
            Err(HandshakeError::InvalidState { .. })
        ));
        // Invalid calls do not fail the handshake
        assert_eq!(handshake.state(), HandshakeState::Idle);
    }

    #[test]
    fn explicit_error_payload_is_rejection() {
        let env = RecordingEnv::default();
        let mut handshake = client();
        handshake.generate_keys(&env).unwrap();
        handshake.request().unwrap();

        let err = handshake.handle_response(&Body::Plain(json!({"error": "nope"}))).unwrap_err();
        assert_eq!(err, HandshakeError::Rejected("nope".into()));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn short_server_key_is_malformed() {
        let env = RecordingEnv::default();
        let mut handshake = client();
        handshake.generate_keys(&env).unwrap();
        handshake.request().unwrap();

        let response =
            ExchangeKeysResponse { server_public_key: vec![1; 31], signing_public_key: vec![2; 32] };
        let err = handshake.handle_response(&response_body(&response)).unwrap_err();
        assert!(matches!(err, HandshakeError::MalformedPeerKey(_)));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn low_order_client_key_is_rejected() {
        let server = EndpointIdentity::from_seed(&[2u8; 32]);
        let request = ExchangeKeysRequest {
            client_id: "c1".into(),
            client_public_key: vec![0u8; 32],
            signing_public_key: vec![1u8; 32],
        };
        assert!(matches!(
            accept_exchange(&server, &request),
            Err(HandshakeError::MalformedPeerKey(_))
        ));
    }

    #[test]
    fn driver_timeout_fails_handshake() {
        let env = RecordingEnv::default();
        let mut handshake = client();
        handshake.generate_keys(&env).unwrap();
        handshake.request().unwrap();

        let err = handshake.fail(HandshakeError::Timeout(std::time::Duration::from_secs(10)));
        assert!(err.is_retryable());
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }
}
