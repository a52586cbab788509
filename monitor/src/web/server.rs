use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::context::MonitoringContext;
use crate::web::{handlers, AppState};

/// Serve the API until `shutdown` resolves
pub async fn start_web_server<F>(context: Arc<MonitoringContext>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", context.config().host, context.config().port);
    let app = create_router(AppState::new(context));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === CLUSTER ROUTES ===
        .route("/api/cluster/nodes", get(handlers::get_cluster_nodes))
        .route("/api/cluster/events", get(handlers::get_cluster_events))
        .route("/api/cluster/user", get(handlers::get_current_user))
        .route("/api/cluster/nodes/{id}/ping", post(handlers::ping_node))
        // === FEED AND DIAGNOSTICS ROUTES ===
        .route("/api/feeds", get(handlers::get_feeds))
        .route("/api/diagnostics", get(handlers::get_diagnostics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
