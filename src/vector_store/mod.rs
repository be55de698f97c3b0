pub mod flat;
pub mod format;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::chunk::DocumentChunk;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Knowledge base not ingested yet. Call /ingest first.")]
    NotBuilt,
    #[error("Vector dimension mismatch: index has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Index files are out of sync: {0}")]
    OutOfSync(String),
    #[error("Corrupt index file: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Chunk metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write statistics for one `store_embeddings` call.
#[derive(Debug, Clone, Default)]
pub struct StoreMetrics {
    pub vector_store_backend: String,
    pub vector_store_rows: u64,
    pub vector_store_bytes: u64,
    pub vector_store_write_s: f64,
}

/// Abstract vector store interface.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the whole index with `chunks` (ids `0..len`, in order).
    async fn store_embeddings(&self, chunks: &[DocumentChunk]) -> Result<StoreMetrics, IndexError>;

    /// Find the `k` nearest chunks by ascending cosine distance, ties by chunk id.
    async fn query_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentChunk>, IndexError>;

    /// Retrieve specific chunks by id, in the order given. Unknown ids are skipped.
    async fn get_chunks_by_id(&self, chunk_ids: &[usize]) -> Result<Vec<DocumentChunk>, IndexError>;

    /// Number of chunks in the served index, `None` when nothing has been ingested.
    async fn chunk_count(&self) -> Result<Option<usize>, IndexError>;

    /// Load any persisted index. Returns whether one was found.
    async fn initialize(&self) -> Result<bool, IndexError>;
}
