//! Tickwire price server.
//!
//! Wraps [`tickwire_core`]'s session logic with a store, a market-data
//! source and a transport listener.
//!
//! # Components
//!
//! - [`Server`]: accepts connections from any [`Listener`] and spawns one
//!   task per connection and one per request
//! - [`Dispatcher`]: method routing, session lookup, seal/open
//! - [`SessionRegistry`]: client id to established session
//! - [`Store`]: time-indexed series, cache and identity secrets
//!   ([`MemoryStore`], [`RedbStore`])
//! - [`Aggregator`]: market-data aggregation and periodic refresh
//! - [`QuinnListener`]: QUIC transport

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod dispatcher;
mod error;
mod handlers;
pub mod identity;
pub mod market;
mod registry;
pub mod storage;
mod transport;

use std::sync::Arc;

use bytes::Bytes;
pub use config::{DEFAULT_REFRESH_INTERVAL, ServerConfig};
pub use dispatcher::{DispatchError, Dispatcher};
pub use error::ServerError;
pub use handlers::{HandlerError, PriceHandlers, matches_pairs};
pub use identity::ServerIdentity;
pub use market::{Aggregator, AggregatorConfig, CoinGecko, MarketData, MarketDataError};
pub use registry::{ClientSession, SessionRegistry};
pub use storage::{MemoryStore, RedbStore, StorageError, Store};
use tickwire_core::{
    Environment, TransportError,
    transport::{Announcement, Connection, Discovery, Listener},
};
use tickwire_proto::Request;
use tokio::task::JoinHandle;
pub use transport::QuinnListener;

/// Tickwire server over a store `S` and environment `E`.
pub struct Server<S: Store, E: Environment> {
    dispatcher: Arc<Dispatcher<S, E>>,
    aggregator: Arc<Aggregator<S, E>>,
    node_id: [u8; 32],
    config: ServerConfig,
}

impl<S: Store, E: Environment> Server<S, E> {
    /// Load or create the identity in `store` and assemble the server.
    ///
    /// # Errors
    ///
    /// - `Identity` or `Storage` if the persisted identity is unusable
    pub fn new(
        config: ServerConfig,
        store: S,
        env: E,
        source: Arc<dyn MarketData>,
    ) -> Result<Self, ServerError> {
        let identity = identity::load_or_create(&store, &env)?;
        let node_id = identity.node_id();

        let aggregator =
            Arc::new(Aggregator::new(source, store, env.clone(), config.aggregator()));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(identity.endpoint),
            Arc::new(SessionRegistry::new()),
            Arc::clone(&aggregator),
            env,
            config.variant,
            config.replay_window,
        ));

        Ok(Self { dispatcher, aggregator, node_id, config })
    }

    /// Request dispatcher shared by every connection.
    pub fn dispatcher(&self) -> &Arc<Dispatcher<S, E>> {
        &self.dispatcher
    }

    /// Discovery node id, derived from the persisted `dht-seed`.
    pub fn node_id(&self) -> [u8; 32] {
        self.node_id
    }

    /// Market-data aggregator.
    pub fn aggregator(&self) -> &Arc<Aggregator<S, E>> {
        &self.aggregator
    }

    /// Start the periodic price refresh.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let aggregator = Arc::clone(&self.aggregator);
        let interval = self.config.refresh_interval;
        tokio::spawn(async move { aggregator.run_refresh_loop(interval).await })
    }

    /// Announce the listener address under the configured topic.
    pub async fn advertise<D: Discovery + ?Sized>(
        &self,
        discovery: &D,
        addr: &str,
    ) -> Result<(), ServerError> {
        let announcement = Announcement { addr: addr.to_string(), node_id: self.node_id };
        discovery.advertise(&self.config.topic, &announcement).await?;
        tracing::info!(
            topic = %self.config.topic,
            addr,
            node_id = %hex::encode(self.node_id),
            "server announced"
        );
        Ok(())
    }

    /// Serve connections until the listener closes.
    pub async fn serve<L: Listener>(&self, mut listener: L) -> Result<(), ServerError> {
        tracing::info!("Server accepting on {}", listener.local_addr());

        loop {
            match listener.accept().await {
                Ok(conn) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(handle_connection(conn, dispatcher));
                },
                Err(TransportError::Closed) => {
                    tracing::info!("listener closed");
                    return Ok(());
                },
                Err(e) => tracing::error!("Accept error: {}", e),
            }
        }
    }
}

/// Read frames from one connection and answer each request in its own task.
async fn handle_connection<S: Store, E: Environment>(
    conn: Connection,
    dispatcher: Arc<Dispatcher<S, E>>,
) {
    let Connection { sender, mut receiver, peer, closer } = conn;
    tracing::debug!(%peer, "connection open");

    while let Some(frame) = receiver.recv().await {
        let request: Request = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "undecodable frame dropped");
                continue;
            },
        };

        let dispatcher = Arc::clone(&dispatcher);
        let sender = sender.clone();
        tokio::spawn(async move {
            let response = dispatcher.dispatch(request).await;
            match serde_json::to_vec(&response) {
                Ok(bytes) => {
                    if sender.send(Bytes::from(bytes)).await.is_err() {
                        tracing::debug!(id = response.id, "connection closed before response");
                    }
                },
                Err(e) => tracing::error!(id = response.id, error = %e, "failed to encode response"),
            }
        });
    }

    tracing::debug!(%peer, "connection closed");
    closer.close();
}
