//! Tickwire client binary.
//!
//! # Usage
//!
//! ```bash
//! tickwire-client --server 127.0.0.1:4433 latest --pairs bitcoin,eth
//! tickwire-client --server 127.0.0.1:4433 historical --from 0 --to 1700000000000
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use tickwire_client::{Client, ClientConfig, ProtocolVariant, SystemEnv, transport::QuinnTransport};
use tickwire_core::DEFAULT_MAX_AGE;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tickwire price client
#[derive(Parser, Debug)]
#[command(name = "tickwire-client")]
#[command(about = "Query a tickwire price server")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    server: String,

    /// Client id (random if omitted)
    #[arg(long)]
    client_id: Option<String>,

    /// Sealing scheme (session-mac, signed-timestamped)
    #[arg(long, default_value_t = ProtocolVariant::default())]
    variant: ProtocolVariant,

    /// Connection attempts
    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// Seconds between connection attempts
    #[arg(long, default_value_t = 2)]
    retry_delay: u64,

    /// Seconds to wait for each response
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Replay window for signed responses, in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_AGE.as_secs())]
    replay_window: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Latest price per symbol
    Latest {
        /// Comma-separated symbol filter
        #[arg(long, value_delimiter = ',')]
        pairs: Option<Vec<String>>,
    },
    /// Prices in [from, to) per symbol
    Historical {
        /// Inclusive start, ms since epoch
        #[arg(long)]
        from: u64,
        /// Exclusive end, ms since epoch
        #[arg(long)]
        to: u64,
        /// Comma-separated symbol filter
        #[arg(long, value_delimiter = ',')]
        pairs: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let env = SystemEnv::new();
    let client_id = args.client_id.clone().unwrap_or_else(|| {
        use tickwire_client::Environment;
        format!("client-{:016x}", env.random_u64())
    });

    let config = ClientConfig {
        variant: args.variant,
        connect_attempts: args.attempts,
        retry_delay: Duration::from_secs(args.retry_delay),
        call_timeout: Duration::from_secs(args.timeout),
        replay_window: Duration::from_secs(args.replay_window),
        ..ClientConfig::new(client_id)
    };

    let transport = QuinnTransport::new()?;
    let mut client = Client::new(config, env);
    client.connect(&transport, &args.server).await?;

    let result = match args.command {
        Command::Latest { pairs } => serde_json::to_string_pretty(&client.latest_prices(pairs).await?)?,
        Command::Historical { from, to, pairs } => {
            serde_json::to_string_pretty(&client.historical_prices(from, to, pairs).await?)?
        },
    };

    #[allow(clippy::print_stdout)]
    {
        println!("{result}");
    }

    client.disconnect();
    Ok(())
}
