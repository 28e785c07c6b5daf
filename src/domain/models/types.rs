//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Core data types shared by the matching engine, the fan-out layer and the wire DTOs:
// tick-scaled prices, orders, trades, level updates and aggregated snapshots.
//
// | Section            | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | PRICE              | Fixed-point price newtype (two fractional digits).               |
// | ENUMS              | Side and OrderType.                                              |
// | STRUCTS            | Order, Trade, LevelUpdate, BookLevel, BookSnapshot.              |
// | TESTS              | Unit tests for the defined types.                                |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of ticks per whole currency unit. Prices carry two fractional digits.
pub const TICKS_PER_UNIT: i64 = 100;

//--------------------------------------------------------------------------------------------------
//  PRICE
//--------------------------------------------------------------------------------------------------

/// Fixed-point price stored as an integer number of ticks (price x 100).
///
/// Scaling to ticks removes float comparison hazards from the matching path.
/// A valid book price is strictly positive; zero and negative values only
/// appear transiently while parsing or validating input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Creates a price from a raw tick count.
    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    pub const fn ticks(&self) -> i64 {
        self.0
    }

    /// True for prices usable on the book.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns this price shifted by a signed tick delta.
    #[inline]
    pub const fn offset(&self, ticks: i64) -> Self {
        Self(self.0 + ticks)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / TICKS_PER_UNIT as u64,
            abs % TICKS_PER_UNIT as u64
        )
    }
}

/// Error parsing a decimal price string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid price literal: {0}")]
pub struct ParsePriceError(pub String);

impl FromStr for Price {
    type Err = ParsePriceError;

    /// Parses decimal literals with up to two fractional digits, e.g. `"101.25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParsePriceError(s.to_string());
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(bad());
        }
        let whole: i64 = whole.parse().map_err(|_| bad())?;
        let frac_ticks: i64 = if frac.is_empty() {
            0
        } else {
            let parsed: i64 = frac.parse().map_err(|_| bad())?;
            if frac.len() == 1 { parsed * 10 } else { parsed }
        };
        Ok(Price(sign * (whole * TICKS_PER_UNIT + frac_ticks)))
    }
}

//--------------------------------------------------------------------------------------------------
//  ENUMS
//--------------------------------------------------------------------------------------------------

/// Represents the side of an order (bid/buy or ask/sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// A buy order.
    Bid,
    /// A sell order.
    Ask,
}

impl Side {
    /// Returns the opposing side.
    #[inline]
    pub const fn opposite(&self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Wire representation: `true` marks the buy side.
    #[inline]
    pub const fn is_buy(&self) -> bool {
        matches!(self, Side::Bid)
    }

    /// Builds a side from the wire boolean (`true` = buy).
    #[inline]
    pub const fn from_is_buy(is_buy: bool) -> Side {
        if is_buy { Side::Bid } else { Side::Ask }
    }
}

/// Represents the type of an order, influencing its matching behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Executes at a specific price or better; the residual rests on the book.
    Limit,
    /// Executes immediately at the best available prices; the residual is discarded.
    Market,
}

//--------------------------------------------------------------------------------------------------
//  STRUCTS
//--------------------------------------------------------------------------------------------------

/// A trading order submitted to one instrument's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Process-wide monotonically increasing identifier, never zero.
    pub id: u64,
    /// Side of the order.
    pub side: Side,
    /// Limit or market.
    pub order_type: OrderType,
    /// Limit price. `None` for market orders; ignored if set on a market order.
    pub limit_price: Option<Price>,
    /// Remaining quantity. Positive at creation; decremented as the order fills.
    pub quantity: u64,
    /// Per-book arrival counter used for time priority. Assigned by the book.
    pub sequence: u64,
    /// Creation instant, informational only.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a limit order.
    pub fn limit(id: u64, side: Side, price: Price, quantity: u64) -> Self {
        Self {
            id,
            side,
            order_type: OrderType::Limit,
            limit_price: Some(price),
            quantity,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    /// Creates a market order.
    pub fn market(id: u64, side: Side, quantity: u64) -> Self {
        Self {
            id,
            side,
            order_type: OrderType::Market,
            limit_price: None,
            quantity,
            sequence: 0,
            created_at: Utc::now(),
        }
    }
}

/// A completed trade between a resting maker order and an incoming taker.
///
/// Trades are append-only; every book retains its full trade log for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Id of the buy-side order.
    pub buy_order_id: u64,
    /// Id of the sell-side order.
    pub sell_order_id: u64,
    /// Execution price. Always the maker's (resting) price.
    pub price: Price,
    /// Traded quantity, always positive.
    pub quantity: u64,
    /// Book sequence number of this trade.
    pub sequence: u64,
    /// Execution instant, informational only.
    pub created_at: DateTime<Utc>,
}

/// Incremental notification replacing the aggregate quantity at one (price, side).
///
/// `quantity == 0` means the level has been removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelUpdate {
    /// Symbol of the instrument this update belongs to.
    pub instrument: String,
    /// Price level affected.
    pub price: Price,
    /// New aggregate resting quantity at the level, zero for removal.
    pub quantity: u64,
    /// Side of the level.
    pub side: Side,
    /// Book sequence number of this update.
    pub sequence: u64,
    /// Emission instant, informational only.
    pub timestamp: DateTime<Utc>,
}

/// One aggregated price level inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// The price for this level.
    pub price: Price,
    /// Total resting quantity at this price.
    pub quantity: u64,
}

/// An aggregated price-level view of one book at a specific sequence number.
///
/// Bids are ordered by price descending, asks ascending. Zero-quantity
/// levels are never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Symbol of the instrument.
    pub instrument: String,
    /// Bid levels, best (highest) first.
    pub bids: Vec<BookLevel>,
    /// Ask levels, best (lowest) first.
    pub asks: Vec<BookLevel>,
    /// Sequence number of the last mutation reflected in this snapshot.
    pub sequence: u64,
    /// Capture instant, informational only.
    pub timestamp: DateTime<Utc>,
}

impl BookSnapshot {
    /// Returns the best bid level if any.
    #[inline]
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    /// Returns the best ask level if any.
    #[inline]
    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    /// Returns the current spread in ticks when both sides are populated.
    #[inline]
    pub fn spread(&self) -> Option<i64> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price.ticks() - bid.price.ticks()),
            _ => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Tick scaling and display of decimal prices.
    #[test]
    fn test_price_display() {
        assert_eq!(Price::from_ticks(10_025).to_string(), "100.25");
        assert_eq!(Price::from_ticks(100).to_string(), "1.00");
        assert_eq!(Price::from_ticks(5).to_string(), "0.05");
        assert_eq!(Price::from_ticks(-250).to_string(), "-2.50");
    }

    /// Parsing decimal literals into tick counts.
    #[test]
    fn test_price_parse() {
        assert_eq!("100.25".parse::<Price>().unwrap(), Price::from_ticks(10_025));
        assert_eq!("100.2".parse::<Price>().unwrap(), Price::from_ticks(10_020));
        assert_eq!("100".parse::<Price>().unwrap(), Price::from_ticks(10_000));
        assert_eq!("0.01".parse::<Price>().unwrap(), Price::from_ticks(1));
        assert!("100.255".parse::<Price>().is_err());
        assert!("".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
    }

    /// Round trip between display and parse.
    #[test]
    fn test_price_round_trip() {
        for ticks in [1, 99, 100, 101, 10_025, 123_456] {
            let price = Price::from_ticks(ticks);
            assert_eq!(price.to_string().parse::<Price>().unwrap(), price);
        }
    }

    /// Side helpers and the wire boolean mapping.
    #[test]
    fn test_side_conversions() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
        assert!(Side::Bid.is_buy());
        assert!(!Side::Ask.is_buy());
        assert_eq!(Side::from_is_buy(true), Side::Bid);
        assert_eq!(Side::from_is_buy(false), Side::Ask);
    }

    /// Basic Order constructor behavior.
    #[test]
    fn test_order_constructors() {
        let limit = Order::limit(1, Side::Bid, Price::from_ticks(10_000), 10);
        assert_eq!(limit.order_type, OrderType::Limit);
        assert_eq!(limit.limit_price, Some(Price::from_ticks(10_000)));
        assert_eq!(limit.quantity, 10);
        assert_eq!(limit.sequence, 0);

        let market = Order::market(2, Side::Ask, 5);
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(market.limit_price, None);
    }

    /// Snapshot accessors on a populated book view.
    #[test]
    fn test_snapshot_accessors() {
        let snapshot = BookSnapshot {
            instrument: "BTC_USD".to_string(),
            bids: vec![
                BookLevel { price: Price::from_ticks(10_000), quantity: 6 },
                BookLevel { price: Price::from_ticks(9_990), quantity: 3 },
            ],
            asks: vec![BookLevel { price: Price::from_ticks(10_010), quantity: 4 }],
            sequence: 7,
            timestamp: Utc::now(),
        };
        assert_eq!(snapshot.best_bid().unwrap().price, Price::from_ticks(10_000));
        assert_eq!(snapshot.best_ask().unwrap().price, Price::from_ticks(10_010));
        assert_eq!(snapshot.spread(), Some(10));
    }

    /// Snapshot accessors on an empty book view.
    #[test]
    fn test_snapshot_empty() {
        let snapshot = BookSnapshot {
            instrument: "BTC_USD".to_string(),
            bids: vec![],
            asks: vec![],
            sequence: 0,
            timestamp: Utc::now(),
        };
        assert_eq!(snapshot.best_bid(), None);
        assert_eq!(snapshot.best_ask(), None);
        assert_eq!(snapshot.spread(), None);
    }
}
