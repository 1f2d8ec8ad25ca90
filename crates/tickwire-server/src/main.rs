//! Tickwire server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store, self-signed certificate (development)
//! tickwire-server --bind 0.0.0.0:4433
//!
//! # Durable store and TLS certificate (production)
//! tickwire-server --bind 0.0.0.0:4433 --db prices.redb --cert cert.pem --key key.pem
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tickwire_core::{
    DEFAULT_MAX_AGE, Environment, ProtocolVariant, SystemEnv, transport::StaticDiscovery,
};
use tickwire_proto::DEFAULT_TOPIC;
use tickwire_server::{
    CoinGecko, DEFAULT_REFRESH_INTERVAL, MemoryStore, QuinnListener, RedbStore, Server,
    ServerConfig, ServerError, Store,
    market::{self, DEFAULT_VENUE_DELAY},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tickwire price server
#[derive(Parser, Debug)]
#[command(name = "tickwire-server")]
#[command(about = "Tickwire encrypted price server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Database file (in-memory if omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Sealing scheme (session-mac, signed-timestamped)
    #[arg(long, default_value_t = ProtocolVariant::default())]
    variant: ProtocolVariant,

    /// Replay window for signed messages, in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_AGE.as_secs())]
    replay_window: u64,

    /// Seconds between price refreshes
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs())]
    refresh_interval: u64,

    /// Symbols to track
    #[arg(long, default_value_t = 5)]
    symbols: usize,

    /// Venues to query per symbol
    #[arg(long, default_value_t = 3)]
    venues: usize,

    /// Milliseconds between consecutive quote requests
    #[arg(long, default_value_t = DEFAULT_VENUE_DELAY.as_millis() as u64)]
    venue_delay_ms: u64,

    /// Market-data API root
    #[arg(long, default_value = market::DEFAULT_BASE_URL)]
    market_data_url: String,

    /// Discovery topic
    #[arg(long, default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind.clone(),
            db_path: self.db.clone(),
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
            variant: self.variant,
            replay_window: Duration::from_secs(self.replay_window),
            refresh_interval: Duration::from_secs(self.refresh_interval),
            symbol_limit: self.symbols,
            venue_limit: self.venues,
            venue_delay: Duration::from_millis(self.venue_delay_ms),
            market_data_url: self.market_data_url.clone(),
            topic: self.topic.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Tickwire server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let config = args.config();
    match &config.db_path {
        Some(path) => run(config.clone(), RedbStore::open(path)?).await?,
        None => {
            tracing::warn!("No database path - prices and identity are not persisted");
            run(config, MemoryStore::new()).await?;
        },
    }

    Ok(())
}

async fn run<S: Store>(config: ServerConfig, store: S) -> Result<(), ServerError> {
    let env = SystemEnv::new();
    let source = Arc::new(CoinGecko::new(config.market_data_url.clone()));
    let listener = QuinnListener::bind(
        &config.bind_address,
        config.cert_path.as_deref(),
        config.key_path.as_deref(),
    )?;
    let addr = listener.socket_addr()?.to_string();

    let server = Server::new(config, store, env, source)?;
    server.advertise(&StaticDiscovery::new(addr.clone()), &addr).await?;
    tracing::info!(at_ms = env.wall_clock_ms(), "Server listening on {}", addr);

    let refresh = server.spawn_refresh();
    let result = server.serve(listener).await;
    refresh.abort();
    result
}
