use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookfeed::api::Api;
use bookfeed::config::Config;
use bookfeed::domain::services::registry::InstrumentRegistry;
use bookfeed::domain::services::simulation::SimulationDriver;

/// Pause between simulation start-ups so the seeded books do not tick in lockstep.
const SIMULATION_STAGGER: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        instruments = config.instruments.len(),
        addr = %config.listen_addr,
        "starting market data server"
    );

    let registry = Arc::new(InstrumentRegistry::new(config.subscriber_buffer));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut drivers = Vec::with_capacity(config.instruments.len());
    for instrument in &config.instruments {
        let market = registry.get_or_create(instrument);
        let driver = SimulationDriver::new(registry.clone(), market, config.driver_config());
        drivers.push(driver.spawn(shutdown_rx.clone()));
        tokio::time::sleep(SIMULATION_STAGGER).await;
    }

    let api = Api::new(config.listen_addr, registry.clone());
    let server = tokio::spawn(api.serve());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // Stop the simulations first, then end every subscriber stream.
    let _ = shutdown_tx.send(true);
    for driver in drivers {
        let _ = driver.await;
    }
    registry.shutdown();
    server.abort();

    Ok(())
}
