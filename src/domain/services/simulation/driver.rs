//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Synthetic order flow for one instrument. The driver seeds the book with a few levels on
// each side of a random mid price, then submits randomized limit and market orders at a
// fixed cadence. It talks to the market exclusively through `Market::submit`, exactly like
// any other order source would.
//
// | Component        | Description                                                            |
// |------------------|------------------------------------------------------------------------|
// | DriverConfig     | Cadence, orders per tick, seeding shape                                |
// | SimulationDriver | Seeding plus the per-tick order generator                              |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::types::{Order, Price, Side};
use crate::domain::services::orderbook::OrderBookError;
use crate::domain::services::registry::{InstrumentRegistry, Market};

/// Shape of the synthetic flow for one instrument.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Pause between ticks.
    pub interval: Duration,
    /// Orders submitted per tick, at least one.
    pub orders_per_tick: u32,
    /// Price levels seeded on each side at startup.
    pub seed_levels: usize,
    /// Tick distance between seeded levels.
    pub level_spacing_ticks: i64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            orders_per_tick: 1,
            seed_levels: 5,
            level_spacing_ticks: 10,
        }
    }
}

/// Generates synthetic order flow against one market.
pub struct SimulationDriver {
    registry: Arc<InstrumentRegistry>,
    market: Arc<Market>,
    config: DriverConfig,
    rng: StdRng,
}

impl SimulationDriver {
    /// Creates a driver with an entropy-seeded generator.
    pub fn new(registry: Arc<InstrumentRegistry>, market: Arc<Market>, config: DriverConfig) -> Self {
        Self::with_rng(registry, market, config, StdRng::from_entropy())
    }

    /// Creates a driver with a fixed seed, for reproducible runs and tests.
    pub fn seeded(
        registry: Arc<InstrumentRegistry>,
        market: Arc<Market>,
        config: DriverConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(registry, market, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        registry: Arc<InstrumentRegistry>,
        market: Arc<Market>,
        config: DriverConfig,
        rng: StdRng,
    ) -> Self {
        Self { registry, market, config, rng }
    }

    /// Spawns the driver loop: seed the book, then submit orders every tick
    /// until the shutdown signal flips or the book is quarantined.
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let instrument = self.market.instrument().to_string();
            info!(%instrument, "starting simulation");
            self.seed_book();

            let mut ticker = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        // A dropped sender also means the server is going away.
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !self.tick() {
                            break;
                        }
                    }
                }
            }
            info!(%instrument, "simulation stopped");
        })
    }

    /// Populates an empty book with `seed_levels` bids below and asks above a
    /// random mid price, spaced `level_spacing_ticks` apart.
    pub fn seed_book(&mut self) {
        // Mid somewhere in 50.00..=500.00, like a freshly listed simulated symbol.
        let mid = Price::from_ticks(self.rng.gen_range(5_000..=50_000));
        debug!(instrument = %self.market.instrument(), %mid, "seeding book");

        for i in 0..self.config.seed_levels as i64 {
            let price = mid.offset(-i * self.config.level_spacing_ticks);
            let quantity = self.rng.gen_range(5..=20);
            self.submit(Order::limit(self.registry.next_order_id(), Side::Bid, price, quantity));
        }
        for i in 0..self.config.seed_levels as i64 {
            let price = mid.offset(self.config.level_spacing_ticks * (i + 1));
            let quantity = self.rng.gen_range(5..=20);
            self.submit(Order::limit(self.registry.next_order_id(), Side::Ask, price, quantity));
        }
    }

    /// Submits one tick's worth of synthetic orders. Returns false once the
    /// market stops accepting orders and the driver should end.
    pub fn tick(&mut self) -> bool {
        for _ in 0..self.config.orders_per_tick.max(1) {
            let price = self.choose_price();
            let quantity = self.rng.gen_range(1..=15);
            let side = if self.rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            let id = self.registry.next_order_id();

            let order = if self.rng.gen_bool(0.8) {
                Order::limit(id, side, price, quantity)
            } else {
                Order::market(id, side, quantity)
            };
            if !self.submit(order) {
                return false;
            }
        }
        true
    }

    /// Picks a price around the current touch: mostly at or inside the spread,
    /// sometimes away from it, so the book both trades and replenishes.
    fn choose_price(&mut self) -> Price {
        let touch = (self.market.best_bid(), self.market.best_ask());
        let ticks = match touch {
            (Some((bid, _)), Some((ask, _))) => {
                if self.rng.gen_bool(0.4) {
                    if self.rng.gen_bool(0.5) { ask.ticks() } else { bid.ticks() }
                } else if self.rng.gen_bool(0.7) {
                    let spread = (ask.ticks() - bid.ticks()).max(0);
                    if self.rng.gen_bool(0.5) {
                        bid.ticks() + self.rng.gen_range(0..=spread)
                    } else {
                        ask.ticks() - self.rng.gen_range(0..=spread)
                    }
                } else if self.rng.gen_bool(0.5) {
                    bid.ticks() - self.rng.gen_range(10..=50)
                } else {
                    ask.ticks() + self.rng.gen_range(10..=50)
                }
            }
            // One-sided or empty book: quote around par until levels build up.
            _ => self.rng.gen_range(9_900..=10_100),
        };
        Price::from_ticks(ticks.max(1))
    }

    /// Submits one order, reporting whether the market is still accepting flow.
    fn submit(&mut self, order: Order) -> bool {
        match self.market.submit(order) {
            Ok(_) => true,
            Err(
                OrderBookError::Quarantined(_) | OrderBookError::InvariantViolation { .. },
            ) => {
                warn!(
                    instrument = %self.market.instrument(),
                    "market no longer accepts orders, stopping simulation"
                );
                false
            }
            Err(err) => {
                // Generated orders should always validate; log and keep going.
                warn!(instrument = %self.market.instrument(), %err, "synthetic order rejected");
                true
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
