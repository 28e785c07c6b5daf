//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Consumer-side order book replica. Reconstructs one instrument's aggregated book from a
// snapshot followed by incremental level updates, gating on sequence numbers so duplicate
// or out-of-order deliveries cannot corrupt the view.
//
// | Component     | Description                                                               |
// |---------------|---------------------------------------------------------------------------|
// | ClientBook    | Two price -> quantity maps plus the last applied sequence number          |
//--------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::domain::models::types::{BookLevel, BookSnapshot, LevelUpdate, Price, Side};

/// Local replica of one instrument's aggregated book.
#[derive(Debug, Clone, Default)]
pub struct ClientBook {
    instrument: String,
    bids: BTreeMap<Price, u64>,
    asks: BTreeMap<Price, u64>,
    /// Sequence of the last applied snapshot or update.
    last_sequence: u64,
    /// False until the first snapshot arrives; updates before it are discarded.
    synced: bool,
}

impl ClientBook {
    /// Creates an empty, unsynced replica.
    pub fn new(instrument: impl Into<String>) -> Self {
        Self { instrument: instrument.into(), ..Self::default() }
    }

    /// Replaces all local state with the snapshot. Applying the same snapshot
    /// twice yields the same state.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        for level in &snapshot.bids {
            if level.quantity > 0 {
                self.bids.insert(level.price, level.quantity);
            }
        }
        for level in &snapshot.asks {
            if level.quantity > 0 {
                self.asks.insert(level.price, level.quantity);
            }
        }
        self.last_sequence = snapshot.sequence;
        self.synced = true;
    }

    /// Applies one incremental update. Returns false when the update was
    /// discarded: either no snapshot has been applied yet, or its sequence is
    /// not beyond the last applied one (duplicate or out-of-order delivery).
    pub fn apply_update(&mut self, update: &LevelUpdate) -> bool {
        if !self.synced || update.sequence <= self.last_sequence {
            return false;
        }
        let side = match update.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if update.quantity > 0 {
            side.insert(update.price, update.quantity);
        } else {
            side.remove(&update.price);
        }
        self.last_sequence = update.sequence;
        true
    }

    /// Best bid price and quantity.
    #[inline]
    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.bids.iter().next_back().map(|(price, quantity)| (*price, *quantity))
    }

    /// Best ask price and quantity.
    #[inline]
    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.asks.iter().next().map(|(price, quantity)| (*price, *quantity))
    }

    /// The `n` highest bids (descending) and `n` lowest asks (ascending).
    pub fn top_n(&self, n: usize) -> (Vec<BookLevel>, Vec<BookLevel>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(n)
            .map(|(price, quantity)| BookLevel { price: *price, quantity: *quantity })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(n)
            .map(|(price, quantity)| BookLevel { price: *price, quantity: *quantity })
            .collect();
        (bids, asks)
    }

    /// All bid levels, best first.
    pub fn bid_levels(&self) -> Vec<BookLevel> {
        self.top_n(self.bids.len()).0
    }

    /// All ask levels, best first.
    pub fn ask_levels(&self) -> Vec<BookLevel> {
        self.top_n(self.asks.len()).1
    }

    /// Sequence of the last applied snapshot or update.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// True once a snapshot has been applied.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Symbol of the replicated instrument.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Formatted top-of-book view for terminal display.
    pub fn display(&self, depth: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- {} (sequence {}) ---", self.instrument, self.last_sequence);
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, bid_qty)), Some((ask, ask_qty))) => {
                let _ = writeln!(out, "Best Bid: {bid} @ {bid_qty} | Best Ask: {ask} @ {ask_qty}");
            }
            (Some((bid, bid_qty)), None) => {
                let _ = writeln!(out, "Best Bid: {bid} @ {bid_qty} | Best Ask: -");
            }
            (None, Some((ask, ask_qty))) => {
                let _ = writeln!(out, "Best Bid: - | Best Ask: {ask} @ {ask_qty}");
            }
            (None, None) => {
                let _ = writeln!(out, "(empty book)");
            }
        }
        let (bids, asks) = self.top_n(depth);
        let _ = writeln!(out, "Asks:");
        for level in asks.iter().rev() {
            let _ = writeln!(out, "  {:>10} {:>8}", level.price.to_string(), level.quantity);
        }
        let _ = writeln!(out, "Bids:");
        for level in &bids {
            let _ = writeln!(out, "  {:>10} {:>8}", level.price.to_string(), level.quantity);
        }
        out
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
