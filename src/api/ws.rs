//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Per-connection subscriber sessions. Each WebSocket subscription attaches to its market
// (snapshot plus update handle taken atomically), sends the snapshot as the stream's first
// message, then forwards updates until the client goes away or the stream gaps.
//
// A session that observes dropped updates closes the socket: the client is expected to
// reconnect and receive a fresh snapshot rather than consume a stream with holes.
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path};
use axum::response::Response;
use tracing::{debug, info, warn};

use super::dto::MarketDataMessage;
use super::AppState;

/// WebSocket entry point: `GET /ws/{instrument}`.
pub async fn subscribe(
    ws: WebSocketUpgrade,
    Path(instrument): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state, instrument))
}

/// One subscriber session: attach, snapshot first, then the update stream.
async fn run_session(mut socket: WebSocket, state: Arc<AppState>, instrument: String) {
    let market = state.registry.get_or_create(&instrument);
    let (snapshot, mut handle) = market.attach();
    let subscriber = handle.id();
    info!(%instrument, %subscriber, sequence = snapshot.sequence, "subscriber session started");

    let first = MarketDataMessage::Snapshot(snapshot.into());
    if send_message(&mut socket, &first).await.is_err() {
        market.detach(subscriber);
        return;
    }

    loop {
        tokio::select! {
            update = handle.next() => {
                match update {
                    Some(update) => {
                        let message = MarketDataMessage::Update(update.into());
                        if send_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                        if handle.has_gap() {
                            warn!(
                                %instrument,
                                %subscriber,
                                dropped = handle.dropped_updates(),
                                "update stream gapped, closing for resync"
                            );
                            let _ = socket
                                .send(Message::Close(Some(CloseFrame {
                                    code: close_code::AGAIN,
                                    reason: "stream gapped, reconnect for a fresh snapshot".into(),
                                })))
                                .await;
                            break;
                        }
                    }
                    // The broadcaster closed us: shutdown or a quarantined book.
                    None => {
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::ERROR,
                                reason: "market stream closed".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Pings are answered by the library; other frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    market.detach(subscriber);
    debug!(%instrument, %subscriber, "subscriber session ended");
}

async fn send_message(
    socket: &mut WebSocket,
    message: &MarketDataMessage,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, "failed to serialize stream message");
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await
}
