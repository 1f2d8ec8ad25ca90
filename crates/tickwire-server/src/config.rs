//! Server configuration.

use std::{path::PathBuf, time::Duration};

use tickwire_core::{DEFAULT_MAX_AGE, ProtocolVariant};
use tickwire_proto::DEFAULT_TOPIC;

use crate::market::{AggregatorConfig, DEFAULT_BASE_URL, DEFAULT_VENUE_DELAY};

/// Default interval between price refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Database file; `None` keeps everything in memory
    pub db_path: Option<PathBuf>,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Sealing scheme expected from clients
    pub variant: ProtocolVariant,
    /// Oldest signed message accepted
    pub replay_window: Duration,
    /// Interval between price refreshes
    pub refresh_interval: Duration,
    /// Symbols tracked per refresh
    pub symbol_limit: usize,
    /// Venues queried per symbol
    pub venue_limit: usize,
    /// Pause between consecutive quote requests
    pub venue_delay: Duration,
    /// Market-data API root
    pub market_data_url: String,
    /// Discovery topic the server announces under
    pub topic: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            db_path: None,
            cert_path: None,
            key_path: None,
            variant: ProtocolVariant::default(),
            replay_window: DEFAULT_MAX_AGE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            symbol_limit: 5,
            venue_limit: 3,
            venue_delay: DEFAULT_VENUE_DELAY,
            market_data_url: DEFAULT_BASE_URL.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

impl ServerConfig {
    /// Aggregation settings derived from this configuration.
    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            symbol_limit: self.symbol_limit,
            venue_limit: self.venue_limit,
            venue_delay: self.venue_delay,
            ..AggregatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.replay_window, Duration::from_secs(300));
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.topic, "global-discovery-v1");
        assert_eq!(config.variant, ProtocolVariant::SessionMac);

        let aggregator = config.aggregator();
        assert_eq!((aggregator.symbol_limit, aggregator.venue_limit), (5, 3));
        assert_eq!(aggregator.rate_limit_attempts, 3);
        assert_eq!(aggregator.venue_delay, Duration::from_millis(300));
    }
}
