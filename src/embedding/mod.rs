pub mod openai;

use async_trait::async_trait;

/// Abstract embedding model interface.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a list of text chunks for ingestion. Returns one vector per text, in order.
    async fn embed_for_ingestion(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_for_query(&self, query: &str) -> anyhow::Result<Vec<f32>>;

    /// Return the embedding dimensions.
    fn dimensions(&self) -> u32;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return;
    }
    for v in vector.iter_mut() {
        *v = (*v as f64 / norm) as f32;
    }
}
