//! Market-data collaborator.
//!
//! [`MarketData`] is the seam to an external price source. The
//! [`Aggregator`] composes it with the store: read-through caching of the
//! symbol and venue lists, bounded backoff on rate limits, averaging of
//! venue quotes and appending the result to the series.

mod aggregator;
mod coingecko;

pub use aggregator::{Aggregator, AggregatorConfig, DEFAULT_VENUE_DELAY};
use async_trait::async_trait;
pub use coingecko::{CoinGecko, DEFAULT_BASE_URL};
use thiserror::Error;
use tickwire_proto::payloads::Quote;

/// Quote currencies in order of preference.
pub const PREFERRED_TARGETS: [&str; 3] = ["USD", "USDT", "USDC"];

/// Errors from a market-data source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// Source asked us to slow down (HTTP 429)
    #[error("rate limited")]
    RateLimited,

    /// Source failed or has no data for the request
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Source answered with an unexpected shape
    #[error("decode error: {0}")]
    Decode(String),
}

impl MarketDataError {
    /// Returns true for the only error class worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// External price source.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Top `limit` symbols by market capitalization.
    async fn fetch_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError>;

    /// Top `limit` venues.
    async fn fetch_venues(&self, limit: usize) -> Result<Vec<String>, MarketDataError>;

    /// Best quote for `symbol` on `venue`.
    ///
    /// Returns `Unavailable` if the venue lists no quote in a preferred
    /// target currency.
    async fn fetch_quote(&self, symbol: &str, venue: &str) -> Result<Quote, MarketDataError>;
}

/// Pick the quote with the most preferred target currency.
pub fn pick_preferred(quotes: &[Quote]) -> Option<&Quote> {
    PREFERRED_TARGETS
        .iter()
        .find_map(|target| quotes.iter().find(|q| q.target == *target && q.price > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(target: &str, price: f64) -> Quote {
        Quote { venue: "v".into(), price, target: target.into() }
    }

    #[test]
    fn usd_preferred_over_stablecoins() {
        let quotes = [quote("USDC", 3.0), quote("USDT", 2.0), quote("USD", 1.0)];
        assert_eq!(pick_preferred(&quotes).unwrap().target, "USD");
    }

    #[test]
    fn usdt_before_usdc() {
        let quotes = [quote("EUR", 9.0), quote("USDC", 3.0), quote("USDT", 2.0)];
        assert_eq!(pick_preferred(&quotes).unwrap().target, "USDT");
    }

    #[test]
    fn no_preferred_target() {
        assert!(pick_preferred(&[quote("EUR", 1.0), quote("USD", 0.0)]).is_none());
    }
}
