// Service layer: the matching engine, fan-out, lifecycle and simulation.
pub mod broadcast;
pub mod orderbook;
pub mod registry;
pub mod simulation;
