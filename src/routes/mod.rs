pub mod chat;
pub mod health;
pub mod ingest;

use axum::Router;
use std::sync::Arc;

use crate::app::AppState;

/// Build all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ingest::routes())
        .merge(chat::routes())
        .merge(health::routes())
        .with_state(state)
}
