//! Request/response client.
//!
//! `connect` runs transport connect, key exchange and a ping as one unit,
//! retried under the configured policy. Every request carries an id unique
//! to the connection; a reader task routes responses to waiting calls by
//! that id only, so a late answer to a timed-out call is dropped instead of
//! satisfying a newer call.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tickwire_core::{
    ChannelCodec, EndpointIdentity, Environment, HandshakeError, TransportError,
    handshake::ClientHandshake,
    retry::retry,
    transport::{CloseHandle, Connection, Discovery, Transport},
};
use tickwire_proto::{
    Body, CallRequest, CallResponse, Method, Request, Response,
    payloads::{
        HistoricalPrices, HistoricalPricesParams, LatestPrices, LatestPricesParams, PingResponse,
    },
};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{config::ClientConfig, error::ClientError};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Response>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One open connection with its response router.
struct Link {
    outbound: tokio::sync::mpsc::Sender<Bytes>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    _closer: CloseHandle,
}

impl Link {
    fn open(conn: Connection) -> Self {
        let Connection { sender, mut receiver, peer, closer } = conn;
        let pending: Pending = Arc::default();

        let routes = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                let response: Response = match serde_json::from_slice(&frame) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(%peer, error = %e, "undecodable response dropped");
                        continue;
                    },
                };

                let waiter = lock(&routes).remove(&response.id);
                match waiter {
                    Some(waiter) => {
                        // Receiver gone means the call was cancelled
                        let _ = waiter.send(response);
                    },
                    None => tracing::debug!(id = response.id, "response for unknown id dropped"),
                }
            }
            tracing::debug!(%peer, "connection closed by server");
            lock(&routes).clear();
        });

        Self { outbound: sender, pending, next_id: AtomicU64::new(1), reader, _closer: closer }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn round_trip(&self, request: Request, timeout: Duration) -> Result<Response, ClientError> {
        let id = request.id;
        let frame = serde_json::to_vec(&request).map_err(|e| ClientError::Encode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        if self.outbound.send(Bytes::from(frame)).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(TransportError::Closed.into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => {
                lock(&self.pending).remove(&id);
                tracing::debug!(id, ?timeout, "call timed out");
                Err(ClientError::Timeout(timeout))
            },
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Established session: link plus codec.
struct Session {
    link: Link,
    codec: ChannelCodec,
}

/// Tickwire client.
///
/// Generates a fresh identity per instance. Calls take `&self` and may run
/// concurrently.
pub struct Client<E: Environment> {
    config: ClientConfig,
    env: E,
    identity: EndpointIdentity,
    session: Option<Session>,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(config: ClientConfig, env: E) -> Self {
        let identity = EndpointIdentity::generate(&env);
        Self { config, env, identity, session: None }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a session is established.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Connect to `target`, exchange keys and ping, retrying the whole
    /// sequence under the configured policy.
    ///
    /// # Errors
    ///
    /// - `ConnectFailed` with the attempt count and last error once every
    ///   attempt failed
    pub async fn connect<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        target: &str,
    ) -> Result<(), ClientError> {
        self.session = None;
        let policy = self.config.connect_policy();

        let session = retry(&self.env, &policy, |attempt| {
            tracing::info!(attempt, target, "connecting");
            self.establish(transport, target)
        })
        .await
        .map_err(|e| ClientError::ConnectFailed { attempts: e.attempts, last: Box::new(e.last) })?;

        tracing::info!(target, client_id = %self.config.client_id, "session established");
        self.session = Some(session);
        Ok(())
    }

    /// Look the server up under the configured topic, then [`connect`].
    ///
    /// [`connect`]: Client::connect
    pub async fn connect_discovered<T, D>(
        &mut self,
        transport: &T,
        discovery: &D,
    ) -> Result<(), ClientError>
    where
        T: Transport + ?Sized,
        D: Discovery + ?Sized,
    {
        let target = discovery.find(&self.config.topic).await?;
        self.connect(transport, &target).await
    }

    async fn establish<T: Transport + ?Sized>(
        &self,
        transport: &T,
        target: &str,
    ) -> Result<Session, ClientError> {
        let link = Link::open(transport.connect(target).await?);

        let mut handshake =
            ClientHandshake::new(self.config.client_id.clone(), Arc::clone(self.identity.signing()));
        handshake.generate_keys(&self.env)?;
        let payload = handshake.request()?;

        let request = Request {
            id: link.next_id(),
            method: Method::ExchangeKeys.name().to_string(),
            client_id: Some(self.config.client_id.clone()),
            body: Body::Plain(
                serde_json::to_value(&payload).map_err(|e| ClientError::Encode(e.to_string()))?,
            ),
        };

        let response = match link.round_trip(request, self.config.call_timeout).await {
            Ok(response) => response,
            Err(ClientError::Timeout(after)) => {
                return Err(handshake.fail(HandshakeError::Timeout(after)).into());
            },
            Err(ClientError::Transport(e)) => {
                return Err(handshake.fail(HandshakeError::Transport(e.to_string())).into());
            },
            Err(e) => return Err(e),
        };
        let established = handshake.handle_response(&response.body)?;

        let codec = ChannelCodec::new(
            self.config.variant,
            &established.session_key,
            Arc::clone(self.identity.signing()),
            established.server_signing_key,
            self.config.replay_window,
        );

        let session = Session { link, codec };
        self.ping_on(&session).await?;
        Ok(session)
    }

    async fn ping_on(&self, session: &Session) -> Result<PingResponse, ClientError> {
        let request = Request {
            id: session.link.next_id(),
            method: Method::Ping.name().to_string(),
            client_id: Some(self.config.client_id.clone()),
            body: Body::Plain(Value::Null),
        };

        let response = session.link.round_trip(request, self.config.call_timeout).await?;
        let pong = match response.body {
            Body::Plain(value) => serde_json::from_value::<PingResponse>(value)
                .map_err(|e| ClientError::InvalidServerResponse(e.to_string()))?,
            Body::Rejected(reason) => return Err(ClientError::Remote(reason)),
            Body::Sealed(_) => {
                return Err(ClientError::InvalidServerResponse("sealed ping response".into()));
            },
        };

        if !pong.pong {
            return Err(ClientError::InvalidServerResponse("ping not acknowledged".into()));
        }
        Ok(pong)
    }

    /// Liveness check on the established session.
    pub async fn ping(&self) -> Result<PingResponse, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotConnected)?;
        self.ping_on(session).await
    }

    /// Sealed call of `method` with raw JSON `params`.
    ///
    /// Fails with `Timeout` if no response arrives within the call timeout;
    /// the call is not retried.
    ///
    /// # Errors
    ///
    /// - `NotConnected` before a successful `connect`
    /// - `InvalidServerResponse` if the response fails verification or does
    ///   not answer this call
    /// - `Remote` for server business errors and rejections
    pub async fn call(&self, method: Method, params: Value) -> Result<Value, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotConnected)?;
        let id = session.link.next_id();

        let inner = CallRequest { id, method: method.name().to_string(), params };
        let sealed = session
            .codec
            .seal_json(&inner, &self.env)
            .map_err(|e| ClientError::Encode(e.to_string()))?;

        let request = Request {
            id,
            method: method.name().to_string(),
            client_id: Some(self.config.client_id.clone()),
            body: Body::Sealed(sealed),
        };

        let response = session.link.round_trip(request, self.config.call_timeout).await?;
        let sealed = match response.body {
            Body::Sealed(sealed) => sealed,
            Body::Rejected(reason) => return Err(ClientError::Remote(reason)),
            Body::Plain(_) => {
                return Err(ClientError::InvalidServerResponse("unsealed response".into()));
            },
        };

        let answer: CallResponse = session.codec.open_json(&sealed, &self.env).map_err(|e| {
            tracing::warn!(id, error = %e, "response failed verification");
            ClientError::InvalidServerResponse(e.to_string())
        })?;
        if answer.id != id {
            return Err(ClientError::InvalidServerResponse(format!(
                "sealed answer for call {} in frame {id}",
                answer.id
            )));
        }

        answer.into_result().map_err(ClientError::Remote)
    }

    /// Typed sealed call.
    pub async fn call_typed<P: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        params: &P,
    ) -> Result<R, ClientError> {
        let params = serde_json::to_value(params).map_err(|e| ClientError::Encode(e.to_string()))?;
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| ClientError::InvalidServerResponse(e.to_string()))
    }

    /// Latest point per symbol, optionally filtered.
    pub async fn latest_prices(
        &self,
        pairs: Option<Vec<String>>,
    ) -> Result<LatestPrices, ClientError> {
        self.call_typed(Method::GetLatestPrices, &LatestPricesParams { pairs }).await
    }

    /// Points in `[from, to)` per symbol, optionally filtered.
    pub async fn historical_prices(
        &self,
        from: u64,
        to: u64,
        pairs: Option<Vec<String>>,
    ) -> Result<HistoricalPrices, ClientError> {
        self.call_typed(Method::GetHistoricalPrices, &HistoricalPricesParams { from, to, pairs })
            .await
    }

    /// Drop the session and close the connection.
    pub fn disconnect(&mut self) {
        self.session = None;
    }
}
