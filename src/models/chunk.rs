use serde::{Deserialize, Serialize};

/// A chunk held by the vector store: text, its position and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Position of the chunk in the source document.
    pub chunk_id: usize,
    pub content: String,
    /// Dense embedding vector (empty when returned from queries).
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub score: f64,
}

/// Represents a raw chunk from parsing (before embedding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: usize,
    pub content: String,
}

impl Chunk {
    /// Convert to a DocumentChunk with embedding.
    pub fn to_document_chunk(self, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            chunk_id: self.id,
            content: self.content,
            embedding,
            score: 0.0,
        }
    }
}
