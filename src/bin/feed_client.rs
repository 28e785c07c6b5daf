//--------------------------------------------------------------------------------------------------
// FEED CLIENT
//--------------------------------------------------------------------------------------------------
// Terminal consumer for the market-data stream. Subscribes to one or more instruments,
// maintains a local book replica per subscription, and renders the top of each book as
// updates arrive. Connections are staggered and reconnect automatically.
//--------------------------------------------------------------------------------------------------

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookfeed::client::{run_feed, FeedConfig};

/// Pause between subscription start-ups, mirroring real clients trickling in.
const SUBSCRIBE_STAGGER: Duration = Duration::from_millis(300);

#[derive(Parser, Debug)]
#[command(name = "feed-client", about = "Terminal consumer for the bookfeed market-data stream")]
struct Args {
    /// WebSocket endpoint of the market data server
    #[arg(long, default_value = "ws://127.0.0.1:50051", env = "BOOKFEED_SERVER")]
    server: String,

    /// Comma-separated instruments to subscribe to
    #[arg(long, value_delimiter = ',', default_value = "BTC_USD,ETH_USD")]
    instruments: Vec<String>,

    /// Price levels per side to render
    #[arg(long, default_value_t = 5)]
    depth: usize,

    /// Suppress book rendering, keep logs only
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(server = %args.server, instruments = args.instruments.len(), "starting feed client");

    let mut tasks = Vec::with_capacity(args.instruments.len());
    for instrument in args.instruments {
        let config = FeedConfig {
            server: args.server.clone(),
            instrument,
            depth: args.depth,
            render: !args.quiet,
        };
        tasks.push(tokio::spawn(run_feed(config)));
        tokio::time::sleep(SUBSCRIBE_STAGGER).await;
    }

    tokio::signal::ctrl_c().await?;
    info!("stopping feed client");
    for task in tasks {
        task.abort();
    }

    Ok(())
}
