//! Request dispatcher.
//!
//! Routes each inbound [`Request`] by method name:
//!
//! - `exchangeKeys` runs the server half of the key exchange and registers
//!   the session
//! - `ping` answers in plaintext
//! - price methods require a registered session; the body is opened with
//!   that session's codec, the inner call is checked against the outer
//!   frame, the handler runs, and its result (or business error) is sealed
//!   back under the same codec
//!
//! Protocol and crypto failures never reach the peer in detail: they are
//! logged here and answered with a generic rejection.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use thiserror::Error;
use tickwire_core::{
    ChannelCodec, CodecError, EndpointIdentity, Environment, ProtocolVariant,
    handshake::accept_exchange,
};
use tickwire_proto::{
    Body, CallRequest, CallResponse, Method, Request, Response, SealedBody,
    payloads::{ErrorPayload, ExchangeKeysRequest, PingResponse},
};

use crate::{
    handlers::{HandlerError, PriceHandlers, decode_params, encode_result},
    market::Aggregator,
    registry::{ClientSession, SessionRegistry},
    storage::Store,
};

/// Why a request was rejected without a sealed answer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// No session registered for the client
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Signature missing, wrong, or the sealed call does not match its frame
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// AEAD tag did not verify
    #[error("decryption failed")]
    DecryptionFailed,

    /// Signed message outside the replay window
    #[error("expired: {0}")]
    Expired(String),

    /// Method name not served
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Frame body has the wrong shape for the method
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Local failure sealing the response
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::DecryptionFailed => Self::DecryptionFailed,
            CodecError::Expired { .. } => Self::Expired(err.to_string()),
            CodecError::Malformed(detail) => Self::InvalidParams(detail),
            CodecError::Seal(detail) => Self::Internal(detail),
            CodecError::InvalidSignature
            | CodecError::Unsigned
            | CodecError::BadSignature
            | CodecError::VariantMismatch { .. } => Self::InvalidSignature(err.to_string()),
        }
    }
}

/// Session-aware request router shared by every connection.
pub struct Dispatcher<S: Store, E: Environment> {
    identity: Arc<EndpointIdentity>,
    registry: Arc<SessionRegistry>,
    handlers: PriceHandlers<S, E>,
    env: E,
    variant: ProtocolVariant,
    replay_window: Duration,
}

impl<S: Store, E: Environment> Dispatcher<S, E> {
    /// Create a dispatcher.
    pub fn new(
        identity: Arc<EndpointIdentity>,
        registry: Arc<SessionRegistry>,
        aggregator: Arc<Aggregator<S, E>>,
        env: E,
        variant: ProtocolVariant,
        replay_window: Duration,
    ) -> Self {
        let handlers = PriceHandlers::new(aggregator, env.clone());
        Self { identity, registry, handlers, env, variant, replay_window }
    }

    /// Registry of established sessions.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Server identity answering key exchanges.
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    /// Handle one request. Never fails: rejections become a generic
    /// rejection response carrying the request id.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id;
        let method = request.method.clone();

        match self.try_dispatch(request).await {
            Ok(body) => Response { id, body },
            Err(e) => {
                tracing::warn!(id, %method, error = %e, "request rejected");
                Response::rejected(id)
            },
        }
    }

    /// Handle one request, reporting why it was rejected.
    pub async fn try_dispatch(&self, request: Request) -> Result<Body, DispatchError> {
        let method = Method::from_name(&request.method)
            .ok_or_else(|| DispatchError::UnknownMethod(request.method.clone()))?;

        match method {
            Method::ExchangeKeys => self.exchange_keys(&request),
            Method::Ping => self.ping(),
            Method::GetLatestPrices | Method::GetHistoricalPrices => {
                self.sealed_call(method, request).await
            },
        }
    }

    fn exchange_keys(&self, request: &Request) -> Result<Body, DispatchError> {
        let Body::Plain(value) = &request.body else {
            return Err(DispatchError::InvalidParams("exchangeKeys body must be plain".into()));
        };
        let exchange: ExchangeKeysRequest = serde_json::from_value(value.clone())
            .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;

        if request.client_id.as_deref().is_some_and(|outer| outer != exchange.client_id) {
            return Err(DispatchError::InvalidParams("clientId mismatch".into()));
        }

        let accepted = match accept_exchange(&self.identity, &exchange) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(client_id = %exchange.client_id, error = %e, "key exchange failed");
                return plain(&ErrorPayload::new("key exchange failed"));
            },
        };

        let codec = ChannelCodec::new(
            self.variant,
            &accepted.session_key,
            Arc::clone(self.identity.signing()),
            accepted.client_signing_key,
            self.replay_window,
        );
        self.registry.register(ClientSession {
            client_id: exchange.client_id.clone(),
            peer_public_key: accepted.client_public_key,
            session_key: accepted.session_key,
            created_at_ms: self.env.wall_clock_ms(),
            codec,
        });

        tracing::info!(client_id = %exchange.client_id, variant = %self.variant, "session established");
        plain(&accepted.response)
    }

    fn ping(&self) -> Result<Body, DispatchError> {
        plain(&PingResponse { pong: true, timestamp: self.env.wall_clock_ms() })
    }

    async fn sealed_call(&self, method: Method, request: Request) -> Result<Body, DispatchError> {
        let client_id = request
            .client_id
            .ok_or_else(|| DispatchError::Unauthenticated("missing clientId".into()))?;
        let session = self
            .registry
            .lookup(&client_id)
            .ok_or_else(|| DispatchError::Unauthenticated(format!("no session for {client_id}")))?;

        let sealed = match request.body {
            Body::Sealed(sealed) => sealed,
            Body::Plain(_) | Body::Rejected(_) => {
                return Err(DispatchError::InvalidSignature("body is not sealed".into()));
            },
        };

        let call: CallRequest = session.codec.open_json(&sealed, &self.env)?;
        if call.id != request.id || call.method != request.method {
            return Err(DispatchError::InvalidSignature(format!(
                "sealed call {}/{} does not match frame {}/{}",
                call.id, call.method, request.id, request.method
            )));
        }

        let response = match self.run(method, call.params).await {
            Ok(result) => CallResponse::ok(call.id, result),
            Err(e) => {
                tracing::debug!(%client_id, method = method.name(), error = %e, "handler error");
                CallResponse::err(call.id, e.to_string())
            },
        };

        Ok(Body::Sealed(seal(&session.codec, &response, &self.env)?))
    }

    async fn run(&self, method: Method, params: Value) -> Result<Value, HandlerError> {
        match method {
            Method::GetLatestPrices => {
                encode_result(&self.handlers.latest_prices(decode_params(params)?).await?)
            },
            Method::GetHistoricalPrices => {
                let params = serde_json::from_value(params)
                    .map_err(|e| HandlerError::InvalidParams(e.to_string()))?;
                encode_result(&self.handlers.historical_prices(&params)?)
            },
            Method::ExchangeKeys | Method::Ping => Err(HandlerError::InvalidParams(format!(
                "{} is not a sealed method",
                method.name()
            ))),
        }
    }
}

fn plain<T: serde::Serialize>(value: &T) -> Result<Body, DispatchError> {
    serde_json::to_value(value)
        .map(Body::Plain)
        .map_err(|e| DispatchError::Internal(e.to_string()))
}

fn seal<E: Environment>(
    codec: &ChannelCodec,
    response: &CallResponse,
    env: &E,
) -> Result<SealedBody, DispatchError> {
    codec.seal_json(response, env).map_err(DispatchError::from)
}
