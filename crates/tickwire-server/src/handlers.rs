//! Price method handlers.
//!
//! Handlers see decoded parameters only. Their errors are business errors:
//! the dispatcher seals them back to the client as `{error}` and the
//! channel stays open.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tickwire_core::Environment;
use tickwire_proto::payloads::{
    HistoricalPrices, HistoricalPricesParams, LatestPrices, LatestPricesParams, PricesResponse,
};

use crate::{
    market::Aggregator,
    storage::{StorageError, Store},
};

/// Business errors returned to the client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// Upstream market data failed
    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),

    /// Parameters could not be decoded or are inconsistent
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Store failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Result could not be encoded
    #[error("internal error: {0}")]
    Internal(String),
}

/// Whether `symbol` passes the optional pair filter.
///
/// Each filter entry matches if it is a case-insensitive substring of the
/// symbol. An absent or empty filter matches every symbol.
pub fn matches_pairs(symbol: &str, pairs: Option<&[String]>) -> bool {
    match pairs {
        None | Some([]) => true,
        Some(pairs) => {
            let symbol = symbol.to_lowercase();
            pairs.iter().any(|p| symbol.contains(&p.to_lowercase()))
        },
    }
}

/// Decode method parameters; `null` decodes as the default.
pub fn decode_params<T: DeserializeOwned + Default>(params: Value) -> Result<T, HandlerError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

/// Encode a handler result as JSON.
pub fn encode_result<T: Serialize>(result: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(result).map_err(|e| HandlerError::Internal(e.to_string()))
}

/// Handlers for `getLatestPrices` and `getHistoricalPrices`.
pub struct PriceHandlers<S: Store, E: Environment> {
    aggregator: Arc<Aggregator<S, E>>,
    env: E,
}

impl<S: Store, E: Environment> PriceHandlers<S, E> {
    /// Handlers reading from the aggregator's store.
    pub fn new(aggregator: Arc<Aggregator<S, E>>, env: E) -> Self {
        Self { aggregator, env }
    }

    /// Latest point of every matching symbol.
    ///
    /// An empty store triggers one refresh through the aggregator first.
    pub async fn latest_prices(
        &self,
        params: LatestPricesParams,
    ) -> Result<LatestPrices, HandlerError> {
        let store = self.aggregator.store();
        let mut symbols = store.symbols()?;

        if symbols.is_empty() {
            tracing::info!("store empty, refreshing before answering");
            self.aggregator
                .refresh()
                .await
                .map_err(|e| HandlerError::DataSourceUnavailable(e.to_string()))?;
            symbols = store.symbols()?;
        }

        let mut data = BTreeMap::new();
        for symbol in symbols.into_iter().filter(|s| matches_pairs(s, params.pairs.as_deref())) {
            match store.latest(&symbol) {
                Ok(point) => {
                    data.insert(symbol, point);
                },
                Err(StorageError::NotFound(_)) => {},
                Err(e) => return Err(e.into()),
            }
        }

        Ok(PricesResponse { timestamp: self.env.wall_clock_ms(), data })
    }

    /// Points in `[from, to)` for every matching symbol.
    pub fn historical_prices(
        &self,
        params: &HistoricalPricesParams,
    ) -> Result<HistoricalPrices, HandlerError> {
        if params.from > params.to {
            return Err(HandlerError::InvalidParams(format!(
                "from ({}) is after to ({})",
                params.from, params.to
            )));
        }

        let store = self.aggregator.store();
        let mut data = BTreeMap::new();
        for symbol in store.symbols()? {
            if !matches_pairs(&symbol, params.pairs.as_deref()) {
                continue;
            }
            let points = store.range(&symbol, params.from, params.to)?;
            if !points.is_empty() {
                data.insert(symbol, points);
            }
        }

        Ok(PricesResponse { timestamp: self.env.wall_clock_ms(), data })
    }
}
