use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::models::api::ErrorResponse;
use crate::parser::pdf::ExtractError;
use crate::vector_store::IndexError;

/// Failures of the ingestion and chat pipelines, as reported to HTTP callers.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Knowledge base not ingested yet. Call /ingest first.")]
    NotIngested,
    #[error("OpenAI API error: {0:#}")]
    Upstream(anyhow::Error),
    #[error("Error during ingestion: {0}")]
    Extraction(#[from] ExtractError),
    #[error("Index error: {0}")]
    Index(IndexError),
}

impl From<IndexError> for RagError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotBuilt => RagError::NotIngested,
            other => RagError::Index(other),
        }
    }
}

impl From<JsonRejection> for RagError {
    fn from(rejection: JsonRejection) -> Self {
        RagError::InvalidBody(rejection.body_text())
    }
}

impl RagError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::EmptyMessage | RagError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::NotIngested => StatusCode::CONFLICT,
            RagError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RagError::Extraction(_) | RagError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{self}");
        }
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
