//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Limit order book and matching engine for a single instrument. Maintains bid and ask
// orders in price-time priority (FIFO within each price level), matches incoming limit
// and market orders, records trades, and emits coalesced per-level change notifications.
//
// | Component     | Description                                                               |
// |---------------|---------------------------------------------------------------------------|
// | PriceLevel    | FIFO queue of resting orders at one price, with a cached aggregate        |
// | OrderBook     | Two BTreeMap sides, matching loop, trade log, sequence counter            |
// | SubmitOutcome | Trades and coalesced level updates produced by one submit call            |
//
//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                  | Description                                  | Return Type           |
// |-----------------------|----------------------------------------------|-----------------------|
// | submit                | Match an incoming order against the book     | Result<SubmitOutcome> |
// | snapshot              | Aggregated price-level view                  | BookSnapshot          |
// | best_bid / best_ask   | Top of book with aggregate quantity          | Option<(Price, u64)>  |
// | trades                | Append-only trade log                        | &[Trade]              |
//--------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;
use thiserror::Error;
use tracing::error;

use crate::domain::models::types::{
    BookLevel, BookSnapshot, LevelUpdate, Order, OrderType, Price, Side, Trade,
};

/// Errors that can occur during order book operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderBookError {
    /// Order quantity must be strictly positive.
    #[error("order quantity must be positive")]
    InvalidQuantity,

    /// Limit price must be strictly positive.
    #[error("limit price must be positive, got {0}")]
    InvalidPrice(Price),

    /// Limit orders must carry a price.
    #[error("limit orders must carry a price")]
    MissingLimitPrice,

    /// The book detected an internal inconsistency and refuses further orders.
    #[error("book for {0} is quarantined and no longer accepts orders")]
    Quarantined(String),

    /// Internal invariant violation. Fatal for this book; other books are unaffected.
    #[error("book invariant violated at sequence {sequence}: {detail}")]
    InvariantViolation { sequence: u64, detail: String },
}

/// Type alias for Result with OrderBookError.
pub type BookResult<T> = Result<T, OrderBookError>;

/// A price level in the order book: a FIFO queue of resting orders at one price.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price for this level.
    pub price: Price,
    /// Resting orders in arrival order.
    pub orders: VecDeque<Order>,
    /// Cached sum of the resting quantities. Kept in lockstep with `orders`.
    pub total_quantity: u64,
}

impl PriceLevel {
    fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::with_capacity(4),
            total_quantity: 0,
        }
    }

    /// Number of resting orders at this level.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Everything one `submit` call produced: executed trades plus the coalesced
/// level updates to broadcast. At most one update per (price, side) is emitted
/// per submit, carrying the post-match aggregate for that level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOutcome {
    /// Trades in execution order.
    pub trades: Vec<Trade>,
    /// Coalesced level updates in sequence order.
    pub updates: Vec<LevelUpdate>,
}

/// Price-time-priority limit order book for a single instrument.
///
/// The book is the single mutator of its own state: `submit` runs the full
/// matching loop synchronously and returns only once all crossing liquidity
/// has been consumed, so a crossed book is never observable from outside.
///
/// Every observable mutation (order arrival, trade, level update) consumes one
/// value from the per-book sequence counter, giving a total order over
/// mutations that snapshots and subscribers share.
#[derive(Debug)]
pub struct OrderBook {
    /// Symbol of the instrument this book manages.
    instrument: String,
    /// Bid side, keyed by price. Best bid is the last key.
    bids: BTreeMap<Price, PriceLevel>,
    /// Ask side, keyed by price. Best ask is the first key.
    asks: BTreeMap<Price, PriceLevel>,
    /// Cache of the best bid price.
    best_bid: Option<Price>,
    /// Cache of the best ask price.
    best_ask: Option<Price>,
    /// Last assigned sequence number. Zero before the first mutation.
    sequence: u64,
    /// Append-only trade log, retained for audit.
    trades: Vec<Trade>,
    /// Sticky flag set on invariant violation. A quarantined book rejects all orders.
    quarantined: bool,
}

impl OrderBook {
    /// Creates a new empty order book for an instrument.
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            best_bid: None,
            best_ask: None,
            sequence: 0,
            trades: Vec::new(),
            quarantined: false,
        }
    }

    /// Submits an order, returning the trades and coalesced level updates it produced.
    ///
    /// Matching follows price-time priority: a buy consumes the lowest ask
    /// levels first, a sell the highest bids, and within one level the FIFO
    /// head fills first. Trades execute at the maker's (resting) price.
    /// An unfilled limit residual rests on the book; a market residual is
    /// discarded silently.
    ///
    /// # Errors
    ///
    /// Validation failures (`InvalidQuantity`, `InvalidPrice`,
    /// `MissingLimitPrice`) leave the book untouched and emit nothing.
    /// `Quarantined` is returned for every call after an invariant violation.
    pub fn submit(&mut self, mut order: Order) -> BookResult<SubmitOutcome> {
        if self.quarantined {
            return Err(OrderBookError::Quarantined(self.instrument.clone()));
        }
        Self::validate(&order)?;

        // Arrival consumes a sequence number; this is the order's time priority.
        self.sequence += 1;
        order.sequence = self.sequence;

        let incoming_side = order.side;
        let maker_side = incoming_side.opposite();
        // Market orders ignore any price they happen to carry.
        let price_bound = match order.order_type {
            OrderType::Limit => order.limit_price,
            OrderType::Market => None,
        };

        let mut outcome = SubmitOutcome::default();
        // Levels whose aggregate changed, in first-touch order. One coalesced
        // update per entry is emitted after matching completes.
        let mut touched: Vec<(Price, Side)> = Vec::new();
        let mut corruption: Option<String> = None;

        while order.quantity > 0 {
            let best_price = match maker_side {
                Side::Ask => self.asks.keys().next().copied(),
                Side::Bid => self.bids.keys().next_back().copied(),
            };
            let Some(best_price) = best_price else { break };

            if let Some(bound) = price_bound {
                let acceptable = match incoming_side {
                    Side::Bid => best_price <= bound,
                    Side::Ask => best_price >= bound,
                };
                if !acceptable {
                    break;
                }
            }

            let book_side = match maker_side {
                Side::Ask => &mut self.asks,
                Side::Bid => &mut self.bids,
            };

            // Fill against the FIFO head of the best opposing level.
            let (trade_qty, maker_id, level_empty) = {
                let Some(level) = book_side.get_mut(&best_price) else {
                    corruption = Some(format!("missing level at {best_price}"));
                    break;
                };
                let Some(maker) = level.orders.front_mut() else {
                    corruption = Some(format!("empty level at {best_price}"));
                    break;
                };
                let trade_qty = order.quantity.min(maker.quantity);
                let maker_id = maker.id;
                maker.quantity -= trade_qty;
                if maker.quantity == 0 {
                    level.orders.pop_front();
                }
                match level.total_quantity.checked_sub(trade_qty) {
                    Some(remaining) => level.total_quantity = remaining,
                    None => {
                        corruption =
                            Some(format!("aggregate underflow at {best_price}"));
                        break;
                    }
                }
                (trade_qty, maker_id, level.orders.is_empty())
            };
            if level_empty {
                book_side.remove(&best_price);
            }
            touch(&mut touched, best_price, maker_side);

            order.quantity -= trade_qty;
            self.sequence += 1;
            let (buy_order_id, sell_order_id) = match incoming_side {
                Side::Bid => (order.id, maker_id),
                Side::Ask => (maker_id, order.id),
            };
            outcome.trades.push(Trade {
                buy_order_id,
                sell_order_id,
                price: best_price,
                quantity: trade_qty,
                sequence: self.sequence,
                created_at: Utc::now(),
            });
        }

        if let Some(detail) = corruption {
            return Err(self.fail_invariant(detail));
        }

        // A limit residual rests on its own side; a market residual vanishes.
        if order.quantity > 0 && order.order_type == OrderType::Limit {
            if let Some(price) = order.limit_price {
                let book_side = match incoming_side {
                    Side::Bid => &mut self.bids,
                    Side::Ask => &mut self.asks,
                };
                let level = book_side.entry(price).or_insert_with(|| PriceLevel::new(price));
                level.total_quantity += order.quantity;
                level.orders.push_back(order.clone());
                touch(&mut touched, price, incoming_side);
            }
        }

        // Emit one coalesced update per touched level, reflecting its final aggregate.
        let now = Utc::now();
        for (price, side) in touched {
            let aggregate = match side {
                Side::Bid => self.bids.get(&price),
                Side::Ask => self.asks.get(&price),
            }
            .map_or(0, |level| level.total_quantity);
            self.sequence += 1;
            outcome.updates.push(LevelUpdate {
                instrument: self.instrument.clone(),
                price,
                quantity: aggregate,
                side,
                sequence: self.sequence,
                timestamp: now,
            });
        }

        self.best_bid = self.bids.keys().next_back().copied();
        self.best_ask = self.asks.keys().next().copied();

        // All crossing liquidity must have been consumed before returning.
        if let (Some(bid), Some(ask)) = (self.best_bid, self.best_ask) {
            if bid >= ask {
                return Err(
                    self.fail_invariant(format!("crossed book at rest: bid {bid} >= ask {ask}"))
                );
            }
        }

        self.trades.extend_from_slice(&outcome.trades);
        Ok(outcome)
    }

    /// Returns the aggregated price-level view at the current sequence number.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            instrument: self.instrument.clone(),
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(price, level)| BookLevel { price: *price, quantity: level.total_quantity })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(price, level)| BookLevel { price: *price, quantity: level.total_quantity })
                .collect(),
            sequence: self.sequence,
            timestamp: Utc::now(),
        }
    }

    /// Returns the best bid price and its aggregate quantity.
    #[inline]
    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.best_bid
            .and_then(|price| self.bids.get(&price).map(|level| (price, level.total_quantity)))
    }

    /// Returns the best ask price and its aggregate quantity.
    #[inline]
    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.best_ask
            .and_then(|price| self.asks.get(&price).map(|level| (price, level.total_quantity)))
    }

    /// Aggregate resting quantity at one (side, price), if the level exists.
    pub fn level_quantity(&self, side: Side, price: Price) -> Option<u64> {
        let book_side = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        book_side.get(&price).map(|level| level.total_quantity)
    }

    /// The full append-only trade log.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// The most recent `limit` trades, oldest first.
    pub fn recent_trades(&self, limit: usize) -> &[Trade] {
        let start = self.trades.len().saturating_sub(limit);
        &self.trades[start..]
    }

    /// Last assigned sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Symbol of the instrument this book manages.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// True once an invariant violation has shut this book down.
    #[inline]
    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }

    fn validate(order: &Order) -> BookResult<()> {
        if order.quantity == 0 {
            return Err(OrderBookError::InvalidQuantity);
        }
        if order.order_type == OrderType::Limit {
            match order.limit_price {
                None => return Err(OrderBookError::MissingLimitPrice),
                Some(price) if !price.is_positive() => {
                    return Err(OrderBookError::InvalidPrice(price));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Marks the book quarantined and builds the fatal error. The flag is
    /// sticky: every later submit fails until the registry tears the book down.
    fn fail_invariant(&mut self, detail: String) -> OrderBookError {
        self.quarantined = true;
        error!(
            instrument = %self.instrument,
            sequence = self.sequence,
            %detail,
            "order book invariant violated, quarantining"
        );
        OrderBookError::InvariantViolation { sequence: self.sequence, detail }
    }
}

/// Records a level as touched, keeping first-touch order and no duplicates.
fn touch(touched: &mut Vec<(Price, Side)>, price: Price, side: Side) {
    if !touched.iter().any(|&(p, s)| p == price && s == side) {
        touched.push((price, side));
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
