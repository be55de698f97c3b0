use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::app::AppState;
use crate::models::api::{HealthResponse, RootResponse};

/// Liveness and banner routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

/// GET /health - Probe endpoint; independent of ingestion state.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// GET /
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "RAG AI Agent API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
