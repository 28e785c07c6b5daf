//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// WebSocket consumer for one instrument: connects to the server's subscription endpoint,
// applies the snapshot-then-updates stream to a ClientBook, and reconnects with backoff
// when the connection drops (including server-initiated resync closes).
//--------------------------------------------------------------------------------------------------

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{info, warn};

use crate::api::dto::MarketDataMessage;
use crate::client::book::ClientBook;

/// Delay before reconnecting after a dropped or refused connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Settings of one feed consumer.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket base, e.g. `ws://127.0.0.1:50051`.
    pub server: String,
    /// Instrument to subscribe to.
    pub instrument: String,
    /// Levels per side to render.
    pub depth: usize,
    /// Print the book after every applied message.
    pub render: bool,
}

/// Applies one wire message to the replica. Returns true when it changed state.
pub fn apply_wire_message(book: &mut ClientBook, message: MarketDataMessage) -> bool {
    match message {
        MarketDataMessage::Snapshot(snapshot) => {
            book.apply_snapshot(&snapshot.into_snapshot());
            true
        }
        MarketDataMessage::Update(update) => book.apply_update(&update.into_update()),
    }
}

/// Runs the consumer loop forever: connect, replicate, reconnect on any error.
pub async fn run_feed(config: FeedConfig) {
    let url = format!("{}/ws/{}", config.server, config.instrument);
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(instrument = %config.instrument, %url, "subscribed");
                consume(stream, &config).await;
                info!(instrument = %config.instrument, "stream ended, reconnecting");
            }
            Err(err) => {
                warn!(instrument = %config.instrument, %err, "connect failed, retrying");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn consume<S>(mut stream: S, config: &FeedConfig)
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    // A fresh replica per connection: every stream starts with its own snapshot.
    let mut book = ClientBook::new(config.instrument.clone());

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(instrument = %config.instrument, %err, "stream error");
                break;
            }
        };
        match frame {
            WsMessage::Text(text) => {
                let message: MarketDataMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(instrument = %config.instrument, %err, "unparseable message");
                        continue;
                    }
                };
                if apply_wire_message(&mut book, message) && config.render {
                    println!("{}", book.display(config.depth));
                }
            }
            WsMessage::Close(frame) => {
                info!(instrument = %config.instrument, ?frame, "server closed stream");
                break;
            }
            _ => {}
        }
    }
}
