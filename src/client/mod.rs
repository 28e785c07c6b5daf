// Consumer side: the book replica and the WebSocket feed that drives it.
pub mod book;
pub mod feed;

pub use book::ClientBook;
pub use feed::{run_feed, FeedConfig};
