// Expose the modules
pub mod api;
pub mod client;
pub mod config;
pub mod domain;

// Re-export key types for easier usage
pub use client::ClientBook;
pub use config::{Config, ConfigError};
pub use domain::models::types::{
    BookLevel, BookSnapshot, LevelUpdate, Order, OrderType, Price, Side, Trade,
};
pub use domain::services::broadcast::{Broadcaster, SubscriberHandle};
pub use domain::services::orderbook::{OrderBook, OrderBookError, SubmitOutcome};
pub use domain::services::registry::{InstrumentRegistry, Market};
pub use domain::services::simulation::{DriverConfig, SimulationDriver};
