// Per-instrument fan-out of level updates.
pub mod broadcaster;

pub use broadcaster::{Broadcaster, SubscriberHandle, DEFAULT_SUBSCRIBER_CAPACITY};
