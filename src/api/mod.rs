//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// HTTP/WebSocket front end built on Axum. REST endpoints expose the registry and book
// state; the WebSocket endpoint carries the market-data stream (one snapshot, then
// incremental level updates) to each subscriber.
//
// | Component      | Description                                                |
// |----------------|-----------------------------------------------------------|
// | AppState       | Shared handle to the instrument registry                   |
// | Api            | Router construction and serving                            |
// | Routes         | REST handler functions                                     |
// | ws             | Per-connection subscriber sessions                         |
// | DTOs           | Wire messages (snapshot / update envelope)                 |
//--------------------------------------------------------------------------------------------------

pub mod dto;
mod error;
mod routes;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::services::registry::InstrumentRegistry;

pub use error::{ApiError, ApiResult};

/// Shared application state accessible by all handlers.
pub struct AppState {
    /// Registry of live markets.
    pub registry: Arc<InstrumentRegistry>,
}

impl AppState {
    /// Creates the shared state around an existing registry.
    pub fn new(registry: Arc<InstrumentRegistry>) -> Self {
        Self { registry }
    }
}

/// The market-data server's HTTP surface.
pub struct Api {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl Api {
    /// Creates a new API instance bound to `addr`.
    pub fn new(addr: SocketAddr, registry: Arc<InstrumentRegistry>) -> Self {
        Self { addr, state: Arc::new(AppState::new(registry)) }
    }

    /// Builds the router with all routes and layers attached.
    pub fn router(&self) -> Router {
        Router::new()
            // Liveness
            .route("/health", get(routes::health))
            // Market data over REST
            .route("/instruments", get(routes::list_instruments))
            .route("/instruments/:instrument/book", get(routes::get_book))
            .route("/instruments/:instrument/trades", get(routes::get_trades))
            // Streaming subscriptions
            .route("/ws/:instrument", get(ws::subscribe))
            .layer(Extension(self.state.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Serves until the listener fails or the process exits.
    pub async fn serve(self) -> std::io::Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "market data server listening");
        axum::serve(listener, app).await
    }
}
