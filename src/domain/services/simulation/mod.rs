// Synthetic order flow drivers.
pub mod driver;

pub use driver::{DriverConfig, SimulationDriver};
