//! Client and server over the in-memory network.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tickwire_client::{Client, ClientConfig, ClientError};
use tickwire_core::{ProtocolVariant, memory::MemoryNetwork, testing::RecordingEnv};
use tickwire_proto::{
    Body,
    payloads::{Quote, SeriesPoint},
};
use tickwire_server::{
    MarketData, MarketDataError, MemoryStore, Server, ServerConfig, Store,
};

struct TwoVenues;

#[async_trait]
impl MarketData for TwoVenues {
    async fn fetch_symbols(&self, _limit: usize) -> Result<Vec<String>, MarketDataError> {
        Ok(vec!["bitcoin".into(), "ethereum".into()])
    }

    async fn fetch_venues(&self, _limit: usize) -> Result<Vec<String>, MarketDataError> {
        Ok(vec!["binance".into(), "kraken".into()])
    }

    async fn fetch_quote(&self, symbol: &str, venue: &str) -> Result<Quote, MarketDataError> {
        let price = match (symbol, venue) {
            ("bitcoin", "binance") => 100.0,
            ("bitcoin", "kraken") => 102.0,
            ("ethereum", "kraken") => 5.0,
            _ => return Err(MarketDataError::Unavailable("no market".into())),
        };
        Ok(Quote { venue: venue.into(), price, target: "USD".into() })
    }
}

struct Harness {
    network: MemoryNetwork,
    env: RecordingEnv,
    server: Arc<Server<MemoryStore, RecordingEnv>>,
    store: MemoryStore,
}

fn start(variant: ProtocolVariant) -> Harness {
    let network = MemoryNetwork::new();
    let env = RecordingEnv::default();
    let store = MemoryStore::new();
    let config = ServerConfig { variant, ..ServerConfig::default() };

    let server =
        Arc::new(Server::new(config, store.clone(), env.clone(), Arc::new(TwoVenues)).unwrap());
    let listener = network.listen("server").unwrap();

    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve(listener).await });

    Harness { network, env, server, store }
}

async fn connected(harness: &Harness, client_id: &str, variant: ProtocolVariant) -> Client<RecordingEnv> {
    let config = ClientConfig { variant, ..ClientConfig::new(client_id) };
    let mut client = Client::new(config, harness.env.clone());
    client.connect(&harness.network, "server").await.unwrap();
    client
}

#[tokio::test]
async fn latest_prices_match_what_the_server_stored() {
    for variant in [ProtocolVariant::SessionMac, ProtocolVariant::SignedTimestamped] {
        let harness = start(variant);
        let client = connected(&harness, "c1", variant).await;

        let prices = client.latest_prices(None).await.unwrap();

        assert_eq!(prices.data.len(), 2);
        assert_eq!(prices.data["bitcoin"].value, 101.0);
        assert_eq!(prices.data["bitcoin"].sources.len(), 2);
        assert_eq!(prices.data["bitcoin"], harness.store.latest("bitcoin").unwrap());
        assert_eq!(prices.data["ethereum"], harness.store.latest("ethereum").unwrap());
    }
}

#[tokio::test]
async fn pair_filter_restricts_symbols() {
    let harness = start(ProtocolVariant::SessionMac);
    let client = connected(&harness, "c1", ProtocolVariant::SessionMac).await;

    let prices = client.latest_prices(Some(vec!["ETH".into()])).await.unwrap();

    assert_eq!(prices.data.keys().collect::<Vec<_>>(), vec!["ethereum"]);
}

#[tokio::test]
async fn historical_prices_are_half_open() {
    let harness = start(ProtocolVariant::SessionMac);
    for at in [100, 200, 300] {
        harness
            .store
            .append(&SeriesPoint {
                symbol: "bitcoin".into(),
                observed_at: at,
                value: at as f64,
                sources: vec![],
            })
            .unwrap();
    }
    let client = connected(&harness, "c1", ProtocolVariant::SessionMac).await;

    let prices = client.historical_prices(100, 300, None).await.unwrap();

    let times: Vec<u64> = prices.data["bitcoin"].iter().map(|p| p.observed_at).collect();
    assert_eq!(times, vec![100, 200]);
}

#[tokio::test]
async fn business_error_keeps_the_channel_open() {
    let harness = start(ProtocolVariant::SessionMac);
    let client = connected(&harness, "c1", ProtocolVariant::SessionMac).await;

    let err = client.historical_prices(10, 1, None).await.unwrap_err();
    assert!(matches!(&err, ClientError::Remote(msg) if msg.starts_with("invalid params")));

    assert!(client.latest_prices(None).await.is_ok());
}

#[tokio::test]
async fn newer_handshake_replaces_older_session() {
    let harness = start(ProtocolVariant::SessionMac);
    let first = connected(&harness, "c1", ProtocolVariant::SessionMac).await;
    let second = connected(&harness, "c1", ProtocolVariant::SessionMac).await;

    assert_eq!(harness.server.dispatcher().registry().len(), 1);

    // The server now opens "c1" requests with the second key
    assert_eq!(
        first.latest_prices(None).await.unwrap_err(),
        ClientError::Remote(Body::REJECTED.to_string())
    );
    assert!(second.latest_prices(None).await.is_ok());
}

#[tokio::test]
async fn variant_mismatch_is_rejected() {
    let harness = start(ProtocolVariant::SessionMac);
    let client = connected(&harness, "c1", ProtocolVariant::SignedTimestamped).await;

    assert_eq!(
        client.latest_prices(None).await.unwrap_err(),
        ClientError::Remote(Body::REJECTED.to_string())
    );
}

#[tokio::test]
async fn server_outlives_a_vanished_client() {
    let harness = start(ProtocolVariant::SessionMac);
    let mut gone = connected(&harness, "gone", ProtocolVariant::SessionMac).await;
    gone.disconnect();

    tokio::time::sleep(Duration::from_millis(10)).await;

    let client = connected(&harness, "c2", ProtocolVariant::SessionMac).await;
    assert!(client.ping().await.unwrap().pong);
}
