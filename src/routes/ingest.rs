use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::RagError;
use crate::models::api::IngestResponse;
use crate::rag;

/// Document ingestion routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ingest", post(ingest_document))
}

/// POST /ingest - Rebuild the index from the configured source document.
async fn ingest_document(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IngestResponse>, RagError> {
    let chunks = rag::ingest(&state).await?;
    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        chunks,
    }))
}
