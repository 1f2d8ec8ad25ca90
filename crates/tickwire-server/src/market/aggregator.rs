//! Price aggregation over a [`MarketData`] source.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde_json::Value;
use tickwire_core::{
    Environment,
    retry::{DEFAULT_RATE_LIMIT_ATTEMPTS, DEFAULT_RATE_LIMIT_BASE, RetryPolicy, retry},
};
use tickwire_proto::payloads::SeriesPoint;

use super::{MarketData, MarketDataError};
use crate::storage::Store;

/// Pause between consecutive quote requests.
pub const DEFAULT_VENUE_DELAY: Duration = Duration::from_millis(300);

/// Aggregation limits and backoff.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Symbols to track
    pub symbol_limit: usize,
    /// Venues to query per symbol
    pub venue_limit: usize,
    /// Attempts per source call when rate limited
    pub rate_limit_attempts: u32,
    /// First backoff delay, doubled after each rate limit
    pub rate_limit_base: Duration,
    /// Pause between consecutive quote requests; zero disables pacing
    pub venue_delay: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            symbol_limit: 5,
            venue_limit: 3,
            rate_limit_attempts: DEFAULT_RATE_LIMIT_ATTEMPTS,
            rate_limit_base: DEFAULT_RATE_LIMIT_BASE,
            venue_delay: DEFAULT_VENUE_DELAY,
        }
    }
}

/// Builds per-symbol price points from a market-data source and appends
/// them to the store.
pub struct Aggregator<S: Store, E: Environment> {
    source: Arc<dyn MarketData>,
    store: S,
    env: E,
    config: AggregatorConfig,
    policy: RetryPolicy<MarketDataError>,
}

impl<S: Store, E: Environment> Aggregator<S, E> {
    /// Create an aggregator writing to `store`.
    pub fn new(source: Arc<dyn MarketData>, store: S, env: E, config: AggregatorConfig) -> Self {
        let policy = RetryPolicy::exponential(config.rate_limit_attempts, config.rate_limit_base)
            .retry_if(MarketDataError::is_rate_limited);
        Self { source, store, env, config, policy }
    }

    /// Store the aggregator writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Top symbols, read through the `topSymbols:{N}` cache entry.
    pub async fn top_symbols(&self) -> Result<Vec<String>, MarketDataError> {
        let limit = self.config.symbol_limit;
        let key = format!("topSymbols:{limit}");
        if let Some(symbols) = self.cached_list(&key) {
            return Ok(symbols);
        }

        let symbols = retry(&self.env, &self.policy, |_| self.source.fetch_symbols(limit))
            .await
            .map_err(|e| e.last)?;
        self.cache_list(&key, &symbols);
        Ok(symbols)
    }

    /// Top venues, read through the `topVenues:{M}` cache entry.
    pub async fn top_venues(&self) -> Result<Vec<String>, MarketDataError> {
        let limit = self.config.venue_limit;
        let key = format!("topVenues:{limit}");
        if let Some(venues) = self.cached_list(&key) {
            return Ok(venues);
        }

        let venues = retry(&self.env, &self.policy, |_| self.source.fetch_venues(limit))
            .await
            .map_err(|e| e.last)?;
        self.cache_list(&key, &venues);
        Ok(venues)
    }

    /// Query every venue for every symbol and average the quotes found.
    ///
    /// Quote requests are spaced by `venue_delay`. A venue that fails (after
    /// backoff on rate limits) is skipped for that symbol; a symbol without
    /// any quote is left out.
    ///
    /// # Errors
    ///
    /// Fails only if the symbol or venue list cannot be obtained.
    pub async fn aggregate(&self) -> Result<BTreeMap<String, SeriesPoint>, MarketDataError> {
        let symbols = self.top_symbols().await?;
        let venues = self.top_venues().await?;
        let observed_at = self.env.wall_clock_ms();

        let mut points = BTreeMap::new();
        let mut requested = false;
        for symbol in &symbols {
            let mut sources = Vec::with_capacity(venues.len());
            for venue in &venues {
                if requested && !self.config.venue_delay.is_zero() {
                    self.env.sleep(self.config.venue_delay).await;
                }
                requested = true;

                match retry(&self.env, &self.policy, |_| self.source.fetch_quote(symbol, venue))
                    .await
                {
                    Ok(quote) => sources.push(quote),
                    Err(e) => {
                        tracing::debug!(%symbol, %venue, attempts = e.attempts, error = %e.last, "no quote");
                    },
                }
            }

            if sources.is_empty() {
                tracing::warn!(%symbol, "no quotes from any venue");
                continue;
            }

            let value = sources.iter().map(|q| q.price).sum::<f64>() / sources.len() as f64;
            points.insert(
                symbol.clone(),
                SeriesPoint { symbol: symbol.clone(), observed_at, value, sources },
            );
        }

        Ok(points)
    }

    /// Aggregate and append one point per symbol.
    ///
    /// Returns the points that were stored. Store failures do not fail the
    /// refresh: a rejected point is logged and skipped, while a fatal backend
    /// error stops appending for this run.
    pub async fn refresh(&self) -> Result<Vec<SeriesPoint>, MarketDataError> {
        let points = self.aggregate().await?;

        let mut stored = Vec::with_capacity(points.len());
        for point in points.into_values() {
            match self.store.append(&point) {
                Ok(()) => stored.push(point),
                Err(e) if e.is_fatal() => {
                    tracing::error!(symbol = %point.symbol, error = %e, "store unusable, refresh abandoned");
                    break;
                },
                Err(e) => tracing::warn!(symbol = %point.symbol, error = %e, "failed to store point"),
            }
        }

        tracing::info!(points = stored.len(), "prices refreshed");
        Ok(stored)
    }

    /// Refresh forever, sleeping `interval` between runs.
    pub async fn run_refresh_loop(&self, interval: Duration) {
        loop {
            if let Err(e) = self.refresh().await {
                tracing::warn!(error = %e, "price refresh failed");
            }
            self.env.sleep(interval).await;
        }
    }

    fn cached_list(&self, key: &str) -> Option<Vec<String>> {
        match self.store.cache_get(key) {
            Ok(Some(value)) => match serde_json::from_value::<Vec<String>>(value) {
                Ok(list) if !list.is_empty() => Some(list),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(key, error = %e, "ignoring malformed cache entry");
                    None
                },
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                None
            },
        }
    }

    fn cache_list(&self, key: &str, list: &[String]) {
        if list.is_empty() {
            return;
        }
        let value = Value::from(list.to_vec());
        if let Err(e) = self.store.cache_put(key, &value) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        sync::Mutex,
    };

    use async_trait::async_trait;
    use serde_json::json;
    use tickwire_core::testing::RecordingEnv;
    use tickwire_proto::payloads::Quote;

    use super::*;
    use crate::storage::{MemoryStore, StorageError};

    /// Scripted source: quote results are popped per (symbol, venue), falling
    /// back to a fixed price once the script is exhausted.
    #[derive(Default)]
    struct ScriptedSource {
        symbols: Vec<String>,
        venues: Vec<String>,
        prices: HashMap<(String, String), f64>,
        script: Mutex<HashMap<(String, String), VecDeque<MarketDataError>>>,
        symbol_calls: Mutex<u32>,
        quote_calls: Mutex<u32>,
    }

    #[async_trait]
    impl MarketData for ScriptedSource {
        async fn fetch_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
            *self.symbol_calls.lock().unwrap() += 1;
            Ok(self.symbols.iter().take(limit).cloned().collect())
        }

        async fn fetch_venues(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
            Ok(self.venues.iter().take(limit).cloned().collect())
        }

        async fn fetch_quote(&self, symbol: &str, venue: &str) -> Result<Quote, MarketDataError> {
            *self.quote_calls.lock().unwrap() += 1;
            let key = (symbol.to_string(), venue.to_string());
            if let Some(err) = self.script.lock().unwrap().get_mut(&key).and_then(VecDeque::pop_front) {
                return Err(err);
            }
            self.prices
                .get(&key)
                .map(|price| Quote { venue: venue.to_string(), price: *price, target: "USD".into() })
                .ok_or_else(|| MarketDataError::Unavailable(format!("{symbol} on {venue}")))
        }
    }

    fn source() -> ScriptedSource {
        let mut prices = HashMap::new();
        prices.insert(("bitcoin".to_string(), "binance".to_string()), 100.0);
        prices.insert(("bitcoin".to_string(), "kraken".to_string()), 200.0);
        prices.insert(("ethereum".to_string(), "kraken".to_string()), 10.0);
        ScriptedSource {
            symbols: vec!["bitcoin".into(), "ethereum".into(), "dogecoin".into()],
            venues: vec!["binance".into(), "kraken".into()],
            prices,
            ..Default::default()
        }
    }

    fn aggregator(source: ScriptedSource) -> (Aggregator<MemoryStore, RecordingEnv>, RecordingEnv) {
        let env = RecordingEnv::new(5_000);
        let config = AggregatorConfig { venue_delay: Duration::ZERO, ..AggregatorConfig::default() };
        (Aggregator::new(Arc::new(source), MemoryStore::new(), env.clone(), config), env)
    }

    #[tokio::test]
    async fn averages_quotes_and_skips_symbols_without_any() {
        let (aggregator, _) = aggregator(source());

        let points = aggregator.aggregate().await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points["bitcoin"].value, 150.0);
        assert_eq!(points["bitcoin"].sources.len(), 2);
        assert_eq!(points["ethereum"].value, 10.0);
        assert!(!points.contains_key("dogecoin"));
    }

    #[tokio::test]
    async fn rate_limited_quote_backs_off_then_succeeds() {
        let source = source();
        source.script.lock().unwrap().insert(
            ("bitcoin".into(), "binance".into()),
            VecDeque::from([MarketDataError::RateLimited, MarketDataError::RateLimited]),
        );
        let (aggregator, env) = aggregator(source);

        let points = aggregator.aggregate().await.unwrap();

        assert_eq!(env.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(points["bitcoin"].value, 150.0);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let source = source();
        source.script.lock().unwrap().insert(
            ("bitcoin".into(), "binance".into()),
            VecDeque::from([MarketDataError::Unavailable("down".into())]),
        );
        let (aggregator, env) = aggregator(source);

        let points = aggregator.aggregate().await.unwrap();

        assert!(env.sleeps().is_empty());
        assert_eq!(points["bitcoin"].value, 200.0);
    }

    #[tokio::test]
    async fn symbol_list_is_read_through_cached() {
        let (aggregator, _) = aggregator(source());

        aggregator.top_symbols().await.unwrap();
        aggregator.top_symbols().await.unwrap();

        assert_eq!(
            aggregator.store().cache_get("topSymbols:5").unwrap(),
            Some(json!(["bitcoin", "ethereum", "dogecoin"]))
        );
    }

    #[tokio::test]
    async fn cached_symbols_skip_the_source() {
        let source = Arc::new(source());
        let store = MemoryStore::new();
        store.cache_put("topSymbols:5", &json!(["ethereum"])).unwrap();
        let aggregator = Aggregator::new(
            source.clone(),
            store,
            RecordingEnv::default(),
            AggregatorConfig::default(),
        );

        assert_eq!(aggregator.top_symbols().await.unwrap(), vec!["ethereum"]);
        assert_eq!(*source.symbol_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn refresh_appends_points_at_current_time() {
        let (aggregator, env) = aggregator(source());

        let stored = aggregator.refresh().await.unwrap();
        assert_eq!(stored.len(), 2);

        let latest = aggregator.store().latest("bitcoin").unwrap();
        assert_eq!(latest.observed_at, 5_000);

        // Same timestamp again is a duplicate; refresh logs and carries on
        assert!(aggregator.refresh().await.unwrap().is_empty());

        env.advance(Duration::from_secs(30));
        assert_eq!(aggregator.refresh().await.unwrap().len(), 2);
        assert_eq!(aggregator.store().range("bitcoin", 0, u64::MAX).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn venue_requests_are_paced() {
        let source = Arc::new(source());
        let aggregator = Aggregator::new(
            source.clone(),
            MemoryStore::new(),
            RecordingEnv::new(5_000),
            AggregatorConfig::default(),
        );

        aggregator.aggregate().await.unwrap();

        assert_eq!(*source.quote_calls.lock().unwrap(), 6);
        assert_eq!(aggregator.env.sleeps(), vec![DEFAULT_VENUE_DELAY; 5]);
    }

    #[tokio::test]
    async fn pacing_and_backoff_share_the_clock() {
        let source = source();
        source
            .script
            .lock()
            .unwrap()
            .insert(("bitcoin".into(), "kraken".into()), VecDeque::from([MarketDataError::RateLimited]));
        let env = RecordingEnv::new(5_000);
        let config = AggregatorConfig {
            venue_delay: Duration::from_millis(100),
            ..AggregatorConfig::default()
        };
        let aggregator = Aggregator::new(Arc::new(source), MemoryStore::new(), env.clone(), config);

        aggregator.aggregate().await.unwrap();

        let pace = Duration::from_millis(100);
        assert_eq!(env.sleeps(), vec![pace, Duration::from_secs(1), pace, pace, pace, pace]);
    }

    /// Store whose appends fail with an I/O error.
    #[derive(Clone, Default)]
    struct BrokenDisk {
        inner: MemoryStore,
        appends: Arc<Mutex<u32>>,
    }

    impl Store for BrokenDisk {
        fn append(&self, _point: &SeriesPoint) -> Result<(), StorageError> {
            *self.appends.lock().unwrap() += 1;
            Err(StorageError::Io("disk full".into()))
        }

        fn latest(&self, symbol: &str) -> Result<SeriesPoint, StorageError> {
            self.inner.latest(symbol)
        }

        fn range(&self, symbol: &str, from: u64, to: u64) -> Result<Vec<SeriesPoint>, StorageError> {
            self.inner.range(symbol, from, to)
        }

        fn symbols(&self) -> Result<Vec<String>, StorageError> {
            self.inner.symbols()
        }

        fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
            self.inner.cache_get(key)
        }

        fn cache_put(&self, key: &str, value: &Value) -> Result<(), StorageError> {
            self.inner.cache_put(key, value)
        }

        fn load_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.load_secret(name)
        }

        fn store_secret(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
            self.inner.store_secret(name, value)
        }
    }

    #[tokio::test]
    async fn fatal_store_error_stops_the_refresh() {
        let store = BrokenDisk::default();
        let config = AggregatorConfig { venue_delay: Duration::ZERO, ..AggregatorConfig::default() };
        let aggregator =
            Aggregator::new(Arc::new(source()), store.clone(), RecordingEnv::new(5_000), config);

        assert!(aggregator.refresh().await.unwrap().is_empty());
        assert_eq!(*store.appends.lock().unwrap(), 1);
    }
}
