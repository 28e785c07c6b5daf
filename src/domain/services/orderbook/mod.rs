// Limit order book and matching engine.
pub mod orderbook;

pub use orderbook::{BookResult, OrderBook, OrderBookError, PriceLevel, SubmitOutcome};
