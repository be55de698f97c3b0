use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::error::RagError;
use crate::models::api::{ChatRequest, ChatResponse};
use crate::rag;

/// Chat routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// POST /chat - Retrieve context for the message and generate an answer.
async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, RagError> {
    let Json(req) = payload?;
    let answer = rag::answer(&state, &req.message).await?;
    info!("Answered chat message ({} chars)", answer.chars().count());
    Ok(Json(ChatResponse { answer }))
}
