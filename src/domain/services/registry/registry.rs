//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Instrument lifecycle and the per-instrument serialization region. A Market couples one
// OrderBook with one Broadcaster under a single mutex: submits publish their updates and
// subscriber attachment captures its snapshot inside the same critical section, which is
// what makes the snapshot/first-update boundary exact. The InstrumentRegistry maps symbols
// to markets, owns the process-wide order id counter, and drives shutdown.
//
// | Component          | Description                                                          |
// |--------------------|----------------------------------------------------------------------|
// | Market             | (OrderBook, Broadcaster) pair under one parking_lot mutex            |
// | InstrumentRegistry | symbol -> Arc<Market>, idempotent creation, order ids, shutdown      |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::models::types::{BookSnapshot, Order, Price, Trade};
use crate::domain::services::broadcast::{Broadcaster, SubscriberHandle};
use crate::domain::services::orderbook::{BookResult, OrderBook, OrderBookError};

/// Book and broadcaster state guarded by the market mutex.
#[derive(Debug)]
struct MarketState {
    book: OrderBook,
    broadcaster: Broadcaster,
}

/// One instrument's book plus its update fan-out.
///
/// All mutating operations (submit, attach, detach, snapshot reads) take the
/// same mutex, so subscribers of one instrument observe a single total order
/// of level updates while separate instruments progress independently.
#[derive(Debug)]
pub struct Market {
    instrument: String,
    state: Mutex<MarketState>,
}

impl Market {
    /// Creates a market with the given per-subscriber queue capacity.
    pub fn new(instrument: impl Into<String>, subscriber_capacity: usize) -> Self {
        let instrument = instrument.into();
        Self {
            state: Mutex::new(MarketState {
                book: OrderBook::new(instrument.clone()),
                broadcaster: Broadcaster::new(instrument.clone(), subscriber_capacity),
            }),
            instrument,
        }
    }

    /// Submits an order and fans the resulting level updates out to every
    /// subscriber before the lock is released. Returns the executed trades.
    ///
    /// An invariant violation quarantines the book and closes all subscriber
    /// streams; validation errors pass through untouched.
    pub fn submit(&self, order: Order) -> BookResult<Vec<Trade>> {
        let mut state = self.state.lock();
        match state.book.submit(order) {
            Ok(outcome) => {
                for update in &outcome.updates {
                    state.broadcaster.publish(update);
                }
                Ok(outcome.trades)
            }
            Err(err @ OrderBookError::InvariantViolation { .. }) => {
                error!(instrument = %self.instrument, %err, "closing subscribers of quarantined book");
                state.broadcaster.close_all();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Atomically captures the current snapshot and registers a subscriber.
    ///
    /// The handle's first delivered update always carries a sequence number
    /// strictly greater than `snapshot.sequence`.
    pub fn attach(&self) -> (BookSnapshot, SubscriberHandle) {
        let mut state = self.state.lock();
        let snapshot = state.book.snapshot();
        let handle = state.broadcaster.register();
        (snapshot, handle)
    }

    /// Removes a subscriber; buffered undelivered updates are dropped.
    pub fn detach(&self, subscriber: Uuid) {
        self.state.lock().broadcaster.detach(subscriber);
    }

    /// Aggregated view of the book at the current sequence number.
    pub fn snapshot(&self) -> BookSnapshot {
        self.state.lock().book.snapshot()
    }

    /// Best bid price and aggregate quantity.
    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.state.lock().book.best_bid()
    }

    /// Best ask price and aggregate quantity.
    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.state.lock().book.best_ask()
    }

    /// The most recent `limit` trades, oldest first.
    pub fn recent_trades(&self, limit: usize) -> Vec<Trade> {
        self.state.lock().book.recent_trades(limit).to_vec()
    }

    /// Symbol of the instrument.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().broadcaster.subscriber_count()
    }

    /// True once the book has been quarantined.
    pub fn is_quarantined(&self) -> bool {
        self.state.lock().book.is_quarantined()
    }

    /// Ends every subscriber stream. Used on shutdown.
    pub fn close(&self) {
        self.state.lock().broadcaster.close_all();
    }
}

/// Maps instrument symbols to their markets and owns process-wide counters.
#[derive(Debug)]
pub struct InstrumentRegistry {
    markets: RwLock<HashMap<String, Arc<Market>>>,
    subscriber_capacity: usize,
    /// Process-wide order id source; ids start at 1 and never repeat.
    next_order_id: AtomicU64,
}

impl InstrumentRegistry {
    /// Creates an empty registry. New markets get subscriber queues of
    /// `subscriber_capacity` updates.
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            markets: RwLock::new(HashMap::new()),
            subscriber_capacity,
            next_order_id: AtomicU64::new(1),
        }
    }

    /// Returns the market for `instrument`, creating it on first use.
    /// Creation is idempotent; concurrent callers get the same market.
    pub fn get_or_create(&self, instrument: &str) -> Arc<Market> {
        if let Some(market) = self.markets.read().get(instrument) {
            return market.clone();
        }
        let mut markets = self.markets.write();
        markets
            .entry(instrument.to_string())
            .or_insert_with(|| {
                info!(%instrument, "creating market");
                Arc::new(Market::new(instrument, self.subscriber_capacity))
            })
            .clone()
    }

    /// Returns the market for `instrument` if it exists.
    pub fn get(&self, instrument: &str) -> Option<Arc<Market>> {
        self.markets.read().get(instrument).cloned()
    }

    /// All known instrument symbols, sorted.
    pub fn list_instruments(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.markets.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Allocates the next order id. Never returns zero.
    pub fn next_order_id(&self) -> u64 {
        self.next_order_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Closes every market's subscriber streams.
    pub fn shutdown(&self) {
        let markets = self.markets.read();
        info!(markets = markets.len(), "shutting down instrument registry");
        for market in markets.values() {
            market.close();
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::types::{Order, Side};

    fn px(literal: &str) -> Price {
        literal.parse().expect("test price literal")
    }

    /// get_or_create returns the same market for the same symbol.
    #[test]
    fn test_get_or_create_idempotent() {
        let registry = InstrumentRegistry::new(16);
        let first = registry.get_or_create("BTC_USD");
        let second = registry.get_or_create("BTC_USD");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.list_instruments(), vec!["BTC_USD".to_string()]);
    }

    /// list_instruments reports every created market, sorted.
    #[test]
    fn test_list_instruments_sorted() {
        let registry = InstrumentRegistry::new(16);
        registry.get_or_create("ETH_USD");
        registry.get_or_create("ADA_USD");
        registry.get_or_create("BTC_USD");
        assert_eq!(
            registry.list_instruments(),
            vec!["ADA_USD".to_string(), "BTC_USD".to_string(), "ETH_USD".to_string()]
        );
    }

    /// Order ids are non-zero and strictly increasing.
    #[test]
    fn test_order_ids_monotonic() {
        let registry = InstrumentRegistry::new(16);
        let first = registry.next_order_id();
        let second = registry.next_order_id();
        assert!(first >= 1);
        assert!(second > first);
    }

    /// Submitted updates reach an attached subscriber in sequence order.
    #[tokio::test]
    async fn test_submit_publishes_to_subscribers() {
        let registry = InstrumentRegistry::new(16);
        let market = registry.get_or_create("BTC_USD");
        let (snapshot, mut handle) = market.attach();
        assert_eq!(snapshot.sequence, 0);

        let id = registry.next_order_id();
        market.submit(Order::limit(id, Side::Bid, px("100.00"), 10)).unwrap();

        let update = handle.next().await.unwrap();
        assert_eq!(update.price, px("100.00"));
        assert_eq!(update.quantity, 10);
        assert!(update.sequence > snapshot.sequence);
    }

    /// A subscriber attached mid-stream only sees updates past its snapshot.
    #[tokio::test]
    async fn test_attach_boundary_is_exact() {
        let registry = InstrumentRegistry::new(64);
        let market = registry.get_or_create("BTC_USD");

        for (id, price) in [(1, "100.00"), (2, "99.00"), (3, "98.00")] {
            market.submit(Order::limit(id, Side::Bid, px(price), 5)).unwrap();
        }

        let (snapshot, mut handle) = market.attach();
        assert_eq!(snapshot.bids.len(), 3);

        market.submit(Order::limit(4, Side::Bid, px("97.00"), 5)).unwrap();
        let update = handle.next().await.unwrap();
        assert!(update.sequence > snapshot.sequence);
        assert_eq!(update.price, px("97.00"));
    }

    /// Shutdown ends every subscriber stream.
    #[tokio::test]
    async fn test_shutdown_closes_streams() {
        let registry = InstrumentRegistry::new(16);
        let market = registry.get_or_create("BTC_USD");
        let (_, mut handle) = market.attach();

        registry.shutdown();
        assert_eq!(handle.next().await, None);
    }

    /// Detached subscribers stop receiving; peers are unaffected.
    #[tokio::test]
    async fn test_detach_isolated() {
        let registry = InstrumentRegistry::new(16);
        let market = registry.get_or_create("BTC_USD");
        let (_, mut gone) = market.attach();
        let (_, mut kept) = market.attach();

        market.detach(gone.id());
        market.submit(Order::limit(1, Side::Bid, px("100.00"), 5)).unwrap();

        assert_eq!(gone.next().await, None);
        assert_eq!(kept.next().await.unwrap().quantity, 5);
    }
}
