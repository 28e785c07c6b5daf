use std::net::SocketAddr;
use std::time::Duration;

use dotenv::dotenv;
use std::env;
use thiserror::Error;

use crate::domain::services::broadcast::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::domain::services::simulation::DriverConfig;

const INSTRUMENTS: &str = "BOOKFEED_INSTRUMENTS";
const SIM_INTERVAL_MS: &str = "BOOKFEED_SIM_INTERVAL_MS";
const ORDERS_PER_TICK: &str = "BOOKFEED_ORDERS_PER_TICK";
const SUBSCRIBER_BUFFER: &str = "BOOKFEED_SUBSCRIBER_BUFFER";
const LISTEN_ADDR: &str = "BOOKFEED_LISTEN_ADDR";

const DEFAULT_INSTRUMENTS: &str = "BTC_USD,ETH_USD,SOL_USD,ADA_USD,XRP_USD";
const DEFAULT_SIM_INTERVAL_MS: u64 = 100;
const DEFAULT_ORDERS_PER_TICK: u32 = 1;
const DEFAULT_SUBSCRIBER_BUFFER: usize = DEFAULT_SUBSCRIBER_CAPACITY;
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:50051";

/// Errors produced while reading the environment configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

/// Runtime configuration of the market-data server.
///
/// Every key is optional; unset keys fall back to defaults matching a small
/// local simulation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instruments created (and simulated) at startup.
    pub instruments: Vec<String>,
    /// Cadence of synthetic order submission per instrument.
    pub simulation_interval: Duration,
    /// Synthetic orders submitted per tick per instrument.
    pub orders_per_tick: u32,
    /// Bound of each subscriber's update queue.
    pub subscriber_buffer: usize,
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: SocketAddr,
}

impl Config {
    /// Loads configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup. Used by `from_env`
    /// and directly by tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let instruments_raw =
            lookup(INSTRUMENTS).unwrap_or_else(|| DEFAULT_INSTRUMENTS.to_string());
        let instruments: Vec<String> = instruments_raw
            .split(',')
            .map(|symbol| symbol.trim().to_string())
            .filter(|symbol| !symbol.is_empty())
            .collect();
        if instruments.is_empty() {
            return Err(ConfigError::Empty { key: INSTRUMENTS });
        }

        let interval_ms = parse_number(SIM_INTERVAL_MS, &lookup, DEFAULT_SIM_INTERVAL_MS)?;
        if interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: SIM_INTERVAL_MS,
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        let orders_per_tick = parse_number(ORDERS_PER_TICK, &lookup, DEFAULT_ORDERS_PER_TICK)?;
        if orders_per_tick == 0 {
            return Err(ConfigError::Invalid {
                key: ORDERS_PER_TICK,
                value: "0".to_string(),
                reason: "at least one order per tick is required".to_string(),
            });
        }

        let subscriber_buffer =
            parse_number(SUBSCRIBER_BUFFER, &lookup, DEFAULT_SUBSCRIBER_BUFFER)?;
        if subscriber_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: SUBSCRIBER_BUFFER,
                value: "0".to_string(),
                reason: "subscriber buffers need at least one slot".to_string(),
            });
        }

        let listen_raw = lookup(LISTEN_ADDR).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr =
            listen_raw.parse().map_err(|_| ConfigError::Invalid {
                key: LISTEN_ADDR,
                value: listen_raw.clone(),
                reason: "expected host:port".to_string(),
            })?;

        Ok(Config {
            instruments,
            simulation_interval: Duration::from_millis(interval_ms),
            orders_per_tick,
            subscriber_buffer,
            listen_addr,
        })
    }

    /// Simulation shape derived from this configuration.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            interval: self.simulation_interval,
            orders_per_tick: self.orders_per_tick,
            ..DriverConfig::default()
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    lookup: impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected an unsigned integer".to_string(),
        }),
    }
}
