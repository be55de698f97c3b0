use tracing::{debug, info};

use crate::app::AppState;
use crate::completion::Message;
use crate::error::RagError;
use crate::models::chunk::DocumentChunk;
use crate::vector_store::{IndexError, VectorStore};

/// Rebuild the index from the configured source document. Returns the chunk count.
///
/// Nothing is persisted unless every chunk was embedded; on failure the
/// previously served index stays in place.
pub async fn ingest(state: &AppState) -> Result<usize, RagError> {
    let _guard = state.ingest_lock.lock().await;

    let source = &state.settings.source_path;
    info!("Ingesting {}", source.display());

    // 1. Extract and chunk.
    let chunks = state.parser.parse_and_chunk(source).await?;

    // 2. Generate embeddings.
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = state
        .embedding_model
        .embed_for_ingestion(&texts)
        .await
        .map_err(RagError::Upstream)?;
    if embeddings.len() != chunks.len() {
        return Err(RagError::Upstream(anyhow::anyhow!(
            "embedding API returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    // 3. Replace the index.
    let doc_chunks: Vec<DocumentChunk> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| chunk.to_document_chunk(embedding))
        .collect();
    let chunk_count = doc_chunks.len();

    let metrics = state.vector_store.store_embeddings(&doc_chunks).await?;
    info!(
        "Ingested {} chunks ({} bytes written to {} store in {:.3}s)",
        metrics.vector_store_rows,
        metrics.vector_store_bytes,
        metrics.vector_store_backend,
        metrics.vector_store_write_s
    );

    // The last id must resolve, or the index and chunk text disagree.
    let last = state.vector_store.get_chunks_by_id(&[chunk_count - 1]).await?;
    if last.len() != 1 {
        return Err(RagError::Index(IndexError::OutOfSync(format!(
            "chunk {} missing after storing {chunk_count} chunks",
            chunk_count - 1
        ))));
    }

    Ok(chunk_count)
}

/// Join retrieved chunk texts into the context block, separated by blank lines.
pub fn build_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_messages(system_prompt: &str, context: &str, question: &str) -> Vec<Message> {
    vec![
        Message::system(system_prompt),
        Message::user(format!("Context:\n{context}\n\nQuestion:\n{question}")),
    ]
}

/// Answer a user message from the top-k retrieved chunks.
pub async fn answer(state: &AppState, message: &str) -> Result<String, RagError> {
    let question = message.trim();
    if question.is_empty() {
        return Err(RagError::EmptyMessage);
    }

    // Checked up front so an empty knowledge base costs no API calls.
    if state.vector_store.chunk_count().await?.is_none() {
        return Err(RagError::NotIngested);
    }

    // 1. Embed the question and retrieve.
    let query_embedding = state
        .embedding_model
        .embed_for_query(question)
        .await
        .map_err(RagError::Upstream)?;
    let hits = state
        .vector_store
        .query_similar(&query_embedding, state.settings.top_k)
        .await?;
    debug!(
        "Retrieved chunks {:?}",
        hits.iter().map(|c| (c.chunk_id, c.score)).collect::<Vec<_>>()
    );

    // 2. Build the prompt.
    let context = build_context(&hits);
    let messages = build_messages(&state.settings.system_prompt, &context, question);

    // 3. Generate.
    let result = state
        .completion_model
        .complete(&messages, state.settings.max_tokens, state.settings.temperature)
        .await
        .map_err(RagError::Upstream)?;
    if let Some(usage) = &result.usage {
        debug!(
            "Completion used {} prompt + {} completion = {} tokens",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    Ok(result.content)
}
