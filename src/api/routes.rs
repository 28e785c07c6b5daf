//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                  | Description                            | Return Type         |
// |-----------------------|----------------------------------------|---------------------|
// | health                | Health check endpoint                  | Response            |
// | list_instruments      | List all known instruments             | Response            |
// | get_book              | Current aggregated book snapshot       | ApiResult<Response> |
// | get_trades            | Recent trades for an instrument        | ApiResult<Response> |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    Json,
};

use super::dto::{SnapshotMessage, TradeMessage};
use super::{ApiError, ApiResult, AppState};

const DEFAULT_TRADE_LIMIT: usize = 50;

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

/// List all known instruments.
pub async fn list_instruments(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list_instruments())
}

/// Current aggregated book snapshot for one instrument.
pub async fn get_book(
    Extension(state): Extension<Arc<AppState>>,
    Path(instrument): Path<String>,
) -> ApiResult<Response> {
    let market = state
        .registry
        .get(&instrument)
        .ok_or_else(|| ApiError::NotFound(format!("Instrument {instrument} not found")))?;

    let snapshot = SnapshotMessage::from(market.snapshot());
    Ok(Json(snapshot).into_response())
}

/// Recent trades for one instrument, oldest first. `?limit=N` caps the count.
pub async fn get_trades(
    Extension(state): Extension<Arc<AppState>>,
    Path(instrument): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    let market = state
        .registry
        .get(&instrument)
        .ok_or_else(|| ApiError::NotFound(format!("Instrument {instrument} not found")))?;

    let limit = match params.get("limit") {
        None => DEFAULT_TRADE_LIMIT,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid limit {raw:?}")))?,
    };

    let trades: Vec<TradeMessage> =
        market.recent_trades(limit).into_iter().map(TradeMessage::from).collect();
    Ok(Json(trades).into_response())
}
