use std::sync::Arc;
use tokio::sync::Mutex;

use crate::completion::CompletionModel;
use crate::config::Settings;
use crate::embedding::EmbeddingModel;
use crate::parser::DocumentParser;
use crate::vector_store::VectorStore;

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub settings: Settings,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedding_model: Arc<dyn EmbeddingModel>,
    pub completion_model: Arc<dyn CompletionModel>,
    pub parser: DocumentParser,
    /// Held for the whole of an ingestion run; ingestion is single-writer.
    pub ingest_lock: Mutex<()>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        vector_store: Arc<dyn VectorStore>,
        embedding_model: Arc<dyn EmbeddingModel>,
        completion_model: Arc<dyn CompletionModel>,
    ) -> Self {
        let parser = DocumentParser::new(
            settings.chunk_size,
            settings.chunk_overlap,
            &settings.pdftotext_bin,
        );
        Self {
            settings,
            vector_store,
            embedding_model,
            completion_model,
            parser,
            ingest_lock: Mutex::new(()),
        }
    }
}
