use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::format::{
    decode_vectors, encode_vectors, ChunkFile, StoredChunk, CHUNKS_FILE, INDEX_FILE,
};
use super::{IndexError, StoreMetrics, VectorStore};
use crate::embedding::normalize_l2;
use crate::models::chunk::DocumentChunk;
use crate::storage::local::LocalStorage;
use crate::storage::StorageError;

/// One immutable generation of the index. Embeddings are unit length.
#[derive(Debug)]
struct IndexSnapshot {
    generation: Uuid,
    dimensions: usize,
    chunks: Vec<DocumentChunk>,
}

/// Exact (brute-force) cosine index persisted as a vector file plus a chunk file.
///
/// Readers clone the current `Arc<IndexSnapshot>` and search without holding the
/// lock. Writers replace both files under `files`, then take the write lock
/// only to swap the snapshot. Loading from disk also holds `files`, so a load
/// never sees a half-written pair. Lock order is `files` then `snapshot`.
pub struct FlatIndexStore {
    storage: LocalStorage,
    files: Mutex<()>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl FlatIndexStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: LocalStorage::new(data_dir),
            files: Mutex::new(()),
            snapshot: RwLock::new(None),
        }
    }

    async fn load_from_disk(&self) -> Result<Option<IndexSnapshot>, IndexError> {
        if !self.storage.exists(INDEX_FILE).await || !self.storage.exists(CHUNKS_FILE).await {
            return Ok(None);
        }

        let vector_file = decode_vectors(&self.storage.download_file(INDEX_FILE).await?)?;
        let chunk_file: ChunkFile =
            serde_json::from_slice(&self.storage.download_file(CHUNKS_FILE).await?)?;

        if vector_file.generation != chunk_file.generation {
            return Err(IndexError::OutOfSync(format!(
                "{INDEX_FILE} is generation {}, {CHUNKS_FILE} is generation {}",
                vector_file.generation, chunk_file.generation
            )));
        }
        if vector_file.dimensions != chunk_file.dimensions
            || vector_file.vectors.len() != chunk_file.chunks.len()
        {
            return Err(IndexError::OutOfSync(format!(
                "{INDEX_FILE} holds {} vectors of {}, {CHUNKS_FILE} holds {} chunks of {}",
                vector_file.vectors.len(),
                vector_file.dimensions,
                chunk_file.chunks.len(),
                chunk_file.dimensions
            )));
        }

        let mut chunks = Vec::with_capacity(chunk_file.chunks.len());
        for (position, (stored, embedding)) in chunk_file
            .chunks
            .into_iter()
            .zip(vector_file.vectors)
            .enumerate()
        {
            if stored.id != position {
                return Err(IndexError::Corrupt(format!(
                    "{CHUNKS_FILE} has chunk id {} at position {position}",
                    stored.id
                )));
            }
            chunks.push(DocumentChunk {
                chunk_id: stored.id,
                content: stored.content,
                embedding,
                score: 0.0,
            });
        }

        Ok(Some(IndexSnapshot {
            generation: vector_file.generation,
            dimensions: vector_file.dimensions,
            chunks,
        }))
    }

    /// The served snapshot, lazily loading a persisted index when none is in memory.
    async fn current(&self) -> Result<Option<Arc<IndexSnapshot>>, IndexError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Some(Arc::clone(snapshot)));
        }

        let _files = self.files.lock().await;
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Some(Arc::clone(snapshot)));
        }
        match self.load_from_disk().await? {
            Some(loaded) => {
                info!(
                    "Loaded index generation {} ({} chunks) from {}",
                    loaded.generation,
                    loaded.chunks.len(),
                    self.storage.base_path().display()
                );
                let loaded = Arc::new(loaded);
                *self.snapshot.write().await = Some(Arc::clone(&loaded));
                Ok(Some(loaded))
            }
            None => Ok(None),
        }
    }

    /// Put back the vector file that preceded a failed write, so the files on
    /// disk stay one generation.
    async fn restore_vectors(&self, previous: Option<Vec<u8>>) {
        let restored = match previous {
            Some(data) => self.storage.upload_bytes(&data, INDEX_FILE).await.map(|_| ()),
            None => self.storage.delete_file(INDEX_FILE).await,
        };
        if let Err(e) = restored {
            warn!("Could not restore {INDEX_FILE} after a failed write: {e}");
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as f64) * (y as f64))
        .sum()
}

#[async_trait]
impl VectorStore for FlatIndexStore {
    async fn initialize(&self) -> Result<bool, IndexError> {
        let _files = self.files.lock().await;
        match self.load_from_disk().await? {
            Some(loaded) => {
                info!(
                    "Loaded index generation {} ({} chunks, {} dimensions)",
                    loaded.generation,
                    loaded.chunks.len(),
                    loaded.dimensions
                );
                *self.snapshot.write().await = Some(Arc::new(loaded));
                Ok(true)
            }
            None => {
                info!(
                    "No index found in {}; waiting for ingestion",
                    self.storage.base_path().display()
                );
                Ok(false)
            }
        }
    }

    async fn store_embeddings(&self, chunks: &[DocumentChunk]) -> Result<StoreMetrics, IndexError> {
        let start = Instant::now();

        let dimensions = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        if dimensions == 0 {
            return Err(IndexError::Corrupt("refusing to store an empty index".to_string()));
        }

        let mut normalized = Vec::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.chunk_id != position {
                return Err(IndexError::Corrupt(format!(
                    "chunk id {} stored at position {position}",
                    chunk.chunk_id
                )));
            }
            if chunk.embedding.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    got: chunk.embedding.len(),
                });
            }
            let mut embedding = chunk.embedding.clone();
            normalize_l2(&mut embedding);
            normalized.push(DocumentChunk {
                chunk_id: chunk.chunk_id,
                content: chunk.content.clone(),
                embedding,
                score: 0.0,
            });
        }

        let generation = Uuid::new_v4();
        let vectors: Vec<&[f32]> = normalized.iter().map(|c| c.embedding.as_slice()).collect();
        let vector_bytes = encode_vectors(generation, dimensions, &vectors);
        let chunk_bytes = serde_json::to_vec(&ChunkFile {
            generation,
            dimensions,
            chunks: normalized
                .iter()
                .map(|c| StoredChunk {
                    id: c.chunk_id,
                    content: c.content.clone(),
                })
                .collect(),
        })?;

        let _files = self.files.lock().await;
        let previous = match self.storage.download_file(INDEX_FILE).await {
            Ok(data) => Some(data),
            Err(StorageError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let mut bytes = self.storage.upload_bytes(&vector_bytes, INDEX_FILE).await?;
        match self.storage.upload_bytes(&chunk_bytes, CHUNKS_FILE).await {
            Ok(written) => bytes += written,
            Err(e) => {
                self.restore_vectors(previous).await;
                return Err(e.into());
            }
        }

        *self.snapshot.write().await = Some(Arc::new(IndexSnapshot {
            generation,
            dimensions,
            chunks: normalized,
        }));

        debug!("Wrote index generation {generation} ({bytes} bytes)");

        Ok(StoreMetrics {
            vector_store_backend: "flat".to_string(),
            vector_store_rows: chunks.len() as u64,
            vector_store_bytes: bytes,
            vector_store_write_s: start.elapsed().as_secs_f64(),
        })
    }

    async fn query_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentChunk>, IndexError> {
        let snapshot = self.current().await?.ok_or(IndexError::NotBuilt)?;
        if query_embedding.len() != snapshot.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: snapshot.dimensions,
                got: query_embedding.len(),
            });
        }

        let mut query = query_embedding.to_vec();
        normalize_l2(&mut query);

        // (cosine distance, position); positions equal chunk ids.
        let mut scored: Vec<(f64, usize)> = snapshot
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (1.0 - dot(&query, &c.embedding), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, i)| {
                let chunk = &snapshot.chunks[i];
                DocumentChunk {
                    chunk_id: chunk.chunk_id,
                    content: chunk.content.clone(),
                    embedding: vec![],
                    score: 1.0 - distance,
                }
            })
            .collect())
    }

    async fn get_chunks_by_id(&self, chunk_ids: &[usize]) -> Result<Vec<DocumentChunk>, IndexError> {
        let snapshot = self.current().await?.ok_or(IndexError::NotBuilt)?;
        Ok(chunk_ids
            .iter()
            .filter_map(|&id| snapshot.chunks.get(id))
            .map(|c| DocumentChunk {
                chunk_id: c.chunk_id,
                content: c.content.clone(),
                embedding: vec![],
                score: 0.0,
            })
            .collect())
    }

    async fn chunk_count(&self) -> Result<Option<usize>, IndexError> {
        Ok(self.current().await?.map(|s| s.chunks.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: usize, content: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id,
            content: content.to_string(),
            embedding,
            score: 0.0,
        }
    }

    fn sample_chunks() -> Vec<DocumentChunk> {
        vec![
            chunk(0, "auto policy", vec![1.0, 0.0, 0.0]),
            chunk(1, "home policy", vec![0.0, 1.0, 0.0]),
            chunk(2, "claims", vec![0.0, 0.0, 2.0]),
            chunk(3, "auto claims", vec![1.0, 0.0, 1.0]),
        ]
    }

    #[tokio::test]
    async fn test_query_before_ingestion() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());

        assert!(!store.initialize().await.unwrap());
        assert_eq!(store.chunk_count().await.unwrap(), None);
        let err = store.query_similar(&[1.0, 0.0, 0.0], 2).await.unwrap_err();
        assert!(matches!(err, IndexError::NotBuilt));
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        let metrics = store.store_embeddings(&sample_chunks()).await.unwrap();
        assert_eq!(metrics.vector_store_rows, 4);
        assert!(metrics.vector_store_bytes > 0);

        let hits = store.query_similar(&[0.0, 0.0, 5.0], 3).await.unwrap();
        let ids: Vec<usize> = hits.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![2, 3, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|c| c.embedding.is_empty()));
    }

    #[tokio::test]
    async fn test_ties_break_by_chunk_id() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store
            .store_embeddings(&[
                chunk(0, "a", vec![0.0, 1.0]),
                chunk(1, "b", vec![1.0, 0.0]),
                chunk(2, "c", vec![2.0, 0.0]),
                chunk(3, "d", vec![0.0, 3.0]),
            ])
            .await
            .unwrap();

        let hits = store.query_similar(&[1.0, 0.0], 4).await.unwrap();
        let ids: Vec<usize> = hits.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 0, 3]);
    }

    #[tokio::test]
    async fn test_k_bounds() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store.store_embeddings(&sample_chunks()).await.unwrap();

        assert!(store.query_similar(&[1.0, 0.0, 0.0], 0).await.unwrap().is_empty());
        assert_eq!(store.query_similar(&[1.0, 0.0, 0.0], 50).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store.store_embeddings(&sample_chunks()).await.unwrap();

        let err = store.query_similar(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[tokio::test]
    async fn test_store_rejects_ragged_vectors() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        let err = store
            .store_embeddings(&[chunk(0, "a", vec![1.0, 0.0]), chunk(1, "b", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(store.chunk_count().await.unwrap(), None);
        assert!(!dir.path().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = FlatIndexStore::new(dir.path());
            store.store_embeddings(&sample_chunks()).await.unwrap();
        }

        let reopened = FlatIndexStore::new(dir.path());
        assert!(reopened.initialize().await.unwrap());
        assert_eq!(reopened.chunk_count().await.unwrap(), Some(4));
        let hits = reopened.query_similar(&[0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].content, "home policy");
    }

    #[tokio::test]
    async fn test_lazy_load_on_first_query() {
        let dir = TempDir::new().unwrap();
        FlatIndexStore::new(dir.path())
            .store_embeddings(&sample_chunks())
            .await
            .unwrap();

        // No initialize(): the first query loads the persisted index.
        let store = FlatIndexStore::new(dir.path());
        let hits = store.query_similar(&[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk_id, 0);
    }

    #[tokio::test]
    async fn test_mismatched_generation_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store.store_embeddings(&sample_chunks()).await.unwrap();

        let stale = ChunkFile {
            generation: Uuid::new_v4(),
            dimensions: 3,
            chunks: (0..4)
                .map(|id| StoredChunk {
                    id,
                    content: format!("stale {id}"),
                })
                .collect(),
        };
        std::fs::write(dir.path().join(CHUNKS_FILE), serde_json::to_vec(&stale).unwrap()).unwrap();

        let reopened = FlatIndexStore::new(dir.path());
        let err = reopened.initialize().await.unwrap_err();
        assert!(matches!(err, IndexError::OutOfSync(_)));
    }

    #[tokio::test]
    async fn test_get_chunks_by_id_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store.store_embeddings(&sample_chunks()).await.unwrap();

        let count = store.chunk_count().await.unwrap().unwrap();
        let ids: Vec<usize> = (0..count).collect();
        let chunks = store.get_chunks_by_id(&ids).await.unwrap();
        assert_eq!(chunks.len(), count);
        assert_eq!(chunks[3].content, "auto claims");

        let partial = store.get_chunks_by_id(&[2, 99, 0]).await.unwrap();
        let ids: Vec<usize> = partial.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![2, 0]);
    }

    #[tokio::test]
    async fn test_failed_chunk_write_restores_vector_file() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store.store_embeddings(&sample_chunks()).await.unwrap();
        let index_before = std::fs::read(dir.path().join(INDEX_FILE)).unwrap();

        // A non-empty directory in place of chunks.json makes the rename fail.
        let chunks_path = dir.path().join(CHUNKS_FILE);
        std::fs::remove_file(&chunks_path).unwrap();
        std::fs::create_dir(&chunks_path).unwrap();
        std::fs::write(chunks_path.join("keep"), b"x").unwrap();

        let result = store
            .store_embeddings(&[chunk(0, "only", vec![1.0, 1.0])])
            .await;
        assert!(matches!(result, Err(IndexError::Storage(_))));

        let index_after = std::fs::read(dir.path().join(INDEX_FILE)).unwrap();
        assert_eq!(index_before, index_after);
        assert_eq!(store.chunk_count().await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_failed_first_write_leaves_no_vector_file() {
        let dir = TempDir::new().unwrap();
        let chunks_path = dir.path().join(CHUNKS_FILE);
        std::fs::create_dir(&chunks_path).unwrap();
        std::fs::write(chunks_path.join("keep"), b"x").unwrap();

        let store = FlatIndexStore::new(dir.path());
        assert!(store.store_embeddings(&sample_chunks()).await.is_err());
        assert!(!dir.path().join(INDEX_FILE).exists());
        assert_eq!(store.chunk_count().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reingest_replaces_index() {
        let dir = TempDir::new().unwrap();
        let store = FlatIndexStore::new(dir.path());
        store.store_embeddings(&sample_chunks()).await.unwrap();
        store
            .store_embeddings(&[chunk(0, "only", vec![1.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.chunk_count().await.unwrap(), Some(1));
        let hits = store.query_similar(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "only");
    }
}
