// Cluster topology endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::common::{from_monitor_error, not_found, ApiResponse, ApiResult};
use crate::cluster::ClusterEvent;
use crate::context::CurrentUser;
use crate::health::PingResult;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    pub cluster: bool,
    pub enterprise: bool,
    pub native_auth: bool,
    pub nodes: Vec<Value>,
}

/// Every discovered member with its current role, reachability and latest ping latency
pub async fn get_cluster_nodes(State(state): State<AppState>) -> ApiResult<ClusterSummary> {
    let context = &state.context;
    let nodes = context
        .nodes()
        .iter()
        .map(|node| {
            let mut entry = node.as_json();
            if let Value::Object(fields) = &mut entry {
                fields.insert("latencyMs".to_string(), json!(context.latency_ms(node)));
            }
            entry
        })
        .collect();

    Ok(Json(ApiResponse::success(ClusterSummary {
        cluster: context.is_cluster(),
        enterprise: context.is_enterprise(),
        native_auth: context.supports_native_auth(),
        nodes,
    })))
}

/// Role changes observed since startup
pub async fn get_cluster_events(State(state): State<AppState>) -> ApiResult<Vec<ClusterEvent>> {
    Ok(Json(ApiResponse::success(state.context.events())))
}

pub async fn get_current_user(State(state): State<AppState>) -> ApiResult<CurrentUser> {
    Ok(Json(ApiResponse::success(state.context.current_user().clone())))
}

/// Wait for the node's next ping sample
pub async fn ping_node(
    Path(node_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PingResult> {
    let node = state
        .context
        .node(&node_id)
        .cloned()
        .ok_or_else(|| not_found(format!("Node '{}' not found", node_id)))?;

    info!("Ping requested for {}", node.address());
    match state.context.ping(&node).await {
        Ok(result) => Ok(Json(ApiResponse::success(result))),
        Err(e) => {
            error!("Ping failed for {}: {}", node.address(), e);
            Err(from_monitor_error(&e))
        }
    }
}
