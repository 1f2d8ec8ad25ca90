//! Method payloads
//!
//! Plain payloads travel directly in [`crate::Body::Plain`]. Price payloads
//! travel as the `params` or `result` of a sealed call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `exchangeKeys` request.
///
/// Both sides always send their Ed25519 verifying key so either protocol
/// variant can be used after the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeKeysRequest {
    /// Client identity the session is registered under
    pub client_id: String,
    /// Client X25519 public key
    #[serde(with = "hex")]
    pub client_public_key: Vec<u8>,
    /// Client Ed25519 verifying key
    #[serde(with = "hex")]
    pub signing_public_key: Vec<u8>,
}

/// `exchangeKeys` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeKeysResponse {
    /// Server X25519 public key
    #[serde(with = "hex")]
    pub server_public_key: Vec<u8>,
    /// Server Ed25519 verifying key
    #[serde(with = "hex")]
    pub signing_public_key: Vec<u8>,
}

/// `ping` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    /// Always true
    pub pong: bool,
    /// Server wall clock in milliseconds
    pub timestamp: u64,
}

/// Error body for plain methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human readable message
    pub error: String,
}

impl ErrorPayload {
    /// Build an error payload from any message.
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// `getLatestPrices` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPricesParams {
    /// Optional symbol filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<String>>,
}

/// `getHistoricalPrices` parameters. The range is `[from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPricesParams {
    /// Inclusive lower bound in milliseconds
    pub from: u64,
    /// Exclusive upper bound in milliseconds
    pub to: u64,
    /// Optional symbol filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<String>>,
}

/// Result of both price methods, keyed by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricesResponse<T> {
    /// Server wall clock when the response was built
    pub timestamp: u64,
    /// Per-symbol data
    pub data: BTreeMap<String, T>,
}

/// `getLatestPrices` result.
pub type LatestPrices = PricesResponse<SeriesPoint>;

/// `getHistoricalPrices` result.
pub type HistoricalPrices = PricesResponse<Vec<SeriesPoint>>;

/// One aggregated observation of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    /// Symbol the point belongs to
    pub symbol: String,
    /// Observation time in milliseconds
    pub observed_at: u64,
    /// Aggregated price
    pub value: f64,
    /// Raw quotes the value was computed from
    pub sources: Vec<Quote>,
}

/// Raw price quote from one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Venue identifier
    pub venue: String,
    /// Quoted price
    pub price: f64,
    /// Quote currency
    pub target: String,
}
