//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name              | Description                                       | Direction            |
// |-------------------|---------------------------------------------------|----------------------|
// | MarketDataMessage | Stream envelope: snapshot or update               | server -> client     |
// | SnapshotMessage   | Full aggregated book at one sequence number       | server -> client     |
// | UpdateMessage     | One coalesced level change                        | server -> client     |
// | TradeMessage      | Executed trade, REST trade-log view               | server -> client     |
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::types::{BookLevel, BookSnapshot, LevelUpdate, Price, Side, Trade};

/// Envelope of the subscription stream. The first message of every stream is a
/// snapshot; everything after is an update in monotonic sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketDataMessage {
    Snapshot(SnapshotMessage),
    Update(UpdateMessage),
}

/// Full aggregated book state. Prices travel as integer ticks (hundredths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub instrument_id: String,
    /// (price, quantity) pairs, best bid first.
    pub bids: Vec<(Price, u64)>,
    /// (price, quantity) pairs, best ask first.
    pub asks: Vec<(Price, u64)>,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// One coalesced level change. `quantity == 0` removes the level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub instrument_id: String,
    pub price: Price,
    pub quantity: u64,
    /// `true` marks the buy side.
    pub side: bool,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// Executed trade as exposed by the REST trade-log endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub price: Price,
    pub quantity: u64,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<BookSnapshot> for SnapshotMessage {
    fn from(snapshot: BookSnapshot) -> Self {
        Self {
            instrument_id: snapshot.instrument,
            bids: snapshot.bids.iter().map(|level| (level.price, level.quantity)).collect(),
            asks: snapshot.asks.iter().map(|level| (level.price, level.quantity)).collect(),
            sequence: snapshot.sequence,
            timestamp: snapshot.timestamp,
        }
    }
}

impl SnapshotMessage {
    /// Rebuilds the domain snapshot on the consumer side.
    pub fn into_snapshot(self) -> BookSnapshot {
        BookSnapshot {
            instrument: self.instrument_id,
            bids: self
                .bids
                .into_iter()
                .map(|(price, quantity)| BookLevel { price, quantity })
                .collect(),
            asks: self
                .asks
                .into_iter()
                .map(|(price, quantity)| BookLevel { price, quantity })
                .collect(),
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }
}

impl From<LevelUpdate> for UpdateMessage {
    fn from(update: LevelUpdate) -> Self {
        Self {
            instrument_id: update.instrument,
            price: update.price,
            quantity: update.quantity,
            side: update.side.is_buy(),
            sequence: update.sequence,
            timestamp: update.timestamp,
        }
    }
}

impl UpdateMessage {
    /// Rebuilds the domain update on the consumer side.
    pub fn into_update(self) -> LevelUpdate {
        LevelUpdate {
            instrument: self.instrument_id,
            price: self.price,
            quantity: self.quantity,
            side: Side::from_is_buy(self.side),
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }
}

impl From<Trade> for TradeMessage {
    fn from(trade: Trade) -> Self {
        Self {
            buy_order_id: trade.buy_order_id,
            sell_order_id: trade.sell_order_id,
            price: trade.price,
            quantity: trade.quantity,
            sequence: trade.sequence,
            timestamp: trade.created_at,
        }
    }
}
