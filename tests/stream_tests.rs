//--------------------------------------------------------------------------------------------------
// INTEGRATION TESTS
//--------------------------------------------------------------------------------------------------
// End-to-end behavior of the market data service: subscriber freshness and convergence,
// slow-subscriber resync, the REST surface, and a real-socket WebSocket subscription.
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tower::util::ServiceExt;

use bookfeed::api::dto::MarketDataMessage;
use bookfeed::api::Api;
use bookfeed::client::feed::apply_wire_message;
use bookfeed::client::ClientBook;
use bookfeed::domain::services::registry::InstrumentRegistry;
use bookfeed::{BookLevel, BookSnapshot, Order, Price, Side};

fn px(literal: &str) -> Price {
    literal.parse().expect("test price literal")
}

fn levels_of(snapshot: &BookSnapshot) -> (Vec<BookLevel>, Vec<BookLevel>) {
    (snapshot.bids.clone(), snapshot.asks.clone())
}

/// Subscribers attached at different times converge to the same book state.
#[tokio::test]
async fn test_subscriber_freshness_and_convergence() {
    let registry = InstrumentRegistry::new(64);
    let market = registry.get_or_create("BTC_USD");

    // A sees the empty book; its replica starts from an empty snapshot.
    let (snapshot_a, mut handle_a) = market.attach();
    assert!(snapshot_a.bids.is_empty() && snapshot_a.asks.is_empty());
    let mut replica_a = ClientBook::new("BTC_USD");
    replica_a.apply_snapshot(&snapshot_a);

    for (id, price) in [(1, "100.00"), (2, "99.00"), (3, "98.00")] {
        market.submit(Order::limit(id, Side::Bid, px(price), 5)).unwrap();
    }

    // B attaches mid-stream and starts from a snapshot reflecting the three levels.
    let (snapshot_b, mut handle_b) = market.attach();
    assert_eq!(snapshot_b.bids.len(), 3);
    let mut replica_b = ClientBook::new("BTC_USD");
    replica_b.apply_snapshot(&snapshot_b);

    market.submit(Order::limit(4, Side::Ask, px("101.00"), 7)).unwrap();

    // A drains four updates, B exactly one; both land on the same sequence.
    for _ in 0..4 {
        let update = handle_a.next().await.unwrap();
        assert!(replica_a.apply_update(&update));
    }
    let update = handle_b.next().await.unwrap();
    assert!(update.sequence > snapshot_b.sequence);
    assert!(replica_b.apply_update(&update));

    let server = market.snapshot();
    assert_eq!(replica_a.last_sequence(), server.sequence);
    assert_eq!(replica_b.last_sequence(), server.sequence);

    let (server_bids, server_asks) = levels_of(&server);
    assert_eq!(replica_a.bid_levels(), server_bids);
    assert_eq!(replica_a.ask_levels(), server_asks);
    assert_eq!(replica_b.bid_levels(), server_bids);
    assert_eq!(replica_b.ask_levels(), server_asks);
}

/// A slow subscriber is flagged for resync; reattaching yields a complete snapshot.
#[tokio::test]
async fn test_slow_subscriber_resync() {
    let registry = InstrumentRegistry::new(2);
    let market = registry.get_or_create("BTC_USD");

    let (_, handle) = market.attach();
    for (id, price) in
        [(1, "100.00"), (2, "99.00"), (3, "98.00"), (4, "97.00"), (5, "96.00")]
    {
        market.submit(Order::limit(id, Side::Bid, px(price), 5)).unwrap();
    }

    // Five updates into a two-slot queue: at least three were dropped.
    assert!(handle.has_gap());
    assert!(handle.dropped_updates() >= 3);

    // The recovery path is a fresh attach: full state, no gap.
    market.detach(handle.id());
    let (snapshot, fresh) = market.attach();
    assert_eq!(snapshot.bids.len(), 5);
    assert!(!fresh.has_gap());
}

/// The REST surface exposes health, instruments, books and trades.
#[tokio::test]
async fn test_rest_endpoints() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    let registry = Arc::new(InstrumentRegistry::new(64));
    let market = registry.get_or_create("BTC_USD");
    market.submit(Order::limit(1, Side::Bid, px("100.00"), 10)).unwrap();
    market.submit(Order::limit(2, Side::Ask, px("100.00"), 4)).unwrap();

    let api = Api::new("127.0.0.1:0".parse().unwrap(), registry.clone());

    let response = api
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api
        .router()
        .oneshot(Request::get("/instruments").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let instruments: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(instruments, vec!["BTC_USD".to_string()]);

    let response = api
        .router()
        .oneshot(Request::get("/instruments/BTC_USD/book").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let book: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(book["instrument_id"], "BTC_USD");
    assert_eq!(book["bids"][0][0], 10_000);
    assert_eq!(book["bids"][0][1], 6);

    let response = api
        .router()
        .oneshot(Request::get("/instruments/BTC_USD/trades").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let trades: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(trades.as_array().unwrap().len(), 1);
    assert_eq!(trades[0]["quantity"], 4);

    let response = api
        .router()
        .oneshot(Request::get("/instruments/NOPE_USD/book").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// A real WebSocket subscription: snapshot first, then updates that replay to
/// exactly the server's book.
#[tokio::test]
async fn test_ws_subscription_end_to_end() {
    let registry = Arc::new(InstrumentRegistry::new(64));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Api::new(addr, registry.clone()).router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("ws://{addr}/ws/BTC_USD");
    let (mut stream, _) = connect_async(url.as_str()).await.expect("connect");

    let mut replica = ClientBook::new("BTC_USD");

    // The stream always opens with a snapshot.
    let first = read_message(&mut stream).await;
    assert!(matches!(first, MarketDataMessage::Snapshot(_)));
    assert!(apply_wire_message(&mut replica, first));

    // Drive the book while subscribed: a resting bid, then a partially
    // crossing ask. Each submit publishes one coalesced update.
    let market = registry.get_or_create("BTC_USD");
    market.submit(Order::limit(1, Side::Bid, px("100.00"), 10)).unwrap();
    market.submit(Order::limit(2, Side::Ask, px("100.00"), 4)).unwrap();

    for _ in 0..2 {
        let message = read_message(&mut stream).await;
        assert!(matches!(message, MarketDataMessage::Update(_)));
        assert!(apply_wire_message(&mut replica, message));
    }

    let server = market.snapshot();
    assert_eq!(replica.last_sequence(), server.sequence);
    let (server_bids, server_asks) = levels_of(&server);
    assert_eq!(replica.bid_levels(), server_bids);
    assert_eq!(replica.ask_levels(), server_asks);
    assert_eq!(replica.best_bid(), Some((px("100.00"), 6)));
}

async fn read_message<S>(stream: &mut S) -> MarketDataMessage
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for stream message")
            .expect("stream ended unexpectedly")
            .expect("stream error");
        match frame {
            WsMessage::Text(text) => {
                return serde_json::from_str(&text).expect("unparseable stream message");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
