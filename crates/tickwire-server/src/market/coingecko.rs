//! CoinGecko REST source.

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use tickwire_proto::payloads::Quote;

use super::{MarketData, MarketDataError, pick_preferred};

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Deserialize)]
struct Listed {
    id: String,
}

#[derive(Deserialize)]
struct TickerPage {
    #[serde(default)]
    tickers: Vec<Ticker>,
}

#[derive(Deserialize)]
struct Ticker {
    target: String,
    #[serde(default)]
    last: Option<f64>,
}

/// [`MarketData`] over the CoinGecko HTTP API.
#[derive(Debug, Clone)]
pub struct CoinGecko {
    http: reqwest::Client,
    base_url: String,
}

impl CoinGecko {
    /// Client against `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "market data request");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited);
        }
        if !status.is_success() {
            return Err(MarketDataError::Unavailable(format!("{path}: HTTP {status}")));
        }

        let body = response.bytes().await.map_err(|e| MarketDataError::Unavailable(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| MarketDataError::Decode(e.to_string()))
    }
}

impl Default for CoinGecko {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl MarketData for CoinGecko {
    async fn fetch_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
        let listed: Vec<Listed> = self
            .get(
                "/coins/markets",
                &[
                    ("vs_currency", "usd".into()),
                    ("order", "market_cap_desc".into()),
                    ("per_page", limit.to_string()),
                    ("page", "1".into()),
                ],
            )
            .await?;
        Ok(listed.into_iter().map(|l| l.id).take(limit).collect())
    }

    async fn fetch_venues(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
        let listed: Vec<Listed> = self
            .get("/exchanges", &[("per_page", limit.to_string()), ("page", "1".into())])
            .await?;
        Ok(listed.into_iter().map(|l| l.id).take(limit).collect())
    }

    async fn fetch_quote(&self, symbol: &str, venue: &str) -> Result<Quote, MarketDataError> {
        let page: TickerPage = self
            .get(
                &format!("/exchanges/{venue}/tickers"),
                &[
                    ("coin_ids", symbol.to_string()),
                    ("include_exchange_logo", "false".into()),
                    ("depth", "1".into()),
                ],
            )
            .await?;
        best_quote(venue, page)
            .ok_or_else(|| MarketDataError::Unavailable(format!("no quote for {symbol} on {venue}")))
    }
}

fn best_quote(venue: &str, page: TickerPage) -> Option<Quote> {
    let quotes: Vec<Quote> = page
        .tickers
        .into_iter()
        .filter_map(|t| {
            t.last.map(|price| Quote { venue: venue.to_string(), price, target: t.target })
        })
        .collect();
    pick_preferred(&quotes).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(json: &str) -> TickerPage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn picks_usd_ticker() {
        let page = page(
            r#"{"name":"Kraken","tickers":[
                {"base":"BTC","target":"EUR","last":90.0},
                {"base":"BTC","target":"USDT","last":101.0},
                {"base":"BTC","target":"USD","last":100.0}
            ]}"#,
        );
        let quote = best_quote("kraken", page).unwrap();
        assert_eq!(quote.target, "USD");
        assert_eq!(quote.price, 100.0);
        assert_eq!(quote.venue, "kraken");
    }

    #[test]
    fn tickers_without_price_are_ignored() {
        let page = page(r#"{"tickers":[{"target":"USD"},{"target":"USDC","last":1.5}]}"#);
        assert_eq!(best_quote("v", page).unwrap().target, "USDC");
    }

    #[test]
    fn empty_page_has_no_quote() {
        assert!(best_quote("v", page("{}")).is_none());
    }
}
