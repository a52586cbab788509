// Data feed and diagnostics endpoints

use axum::{extract::State, response::Json};
use serde_json::Value;
use tracing::info;

use super::common::{ApiResponse, ApiResult};
use crate::feed::FeedStats;
use crate::web::AppState;

pub async fn get_feeds(State(state): State<AppState>) -> ApiResult<Vec<FeedStats>> {
    let stats = state
        .context
        .feeds()
        .all()
        .iter()
        .map(|feed| feed.stats())
        .collect();
    Ok(Json(ApiResponse::success(stats)))
}

/// Fresh diagnostics report; individual probe failures are part of the payload
pub async fn get_diagnostics(State(state): State<AppState>) -> ApiResult<Value> {
    info!("Diagnostics requested");
    Ok(Json(ApiResponse::success(state.context.report().await)))
}
