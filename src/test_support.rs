//! Stub models and state builders shared by unit tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::app::AppState;
use crate::completion::{CompletionModel, CompletionResult, Message};
use crate::config::{Settings, DEFAULT_SYSTEM_PROMPT};
use crate::embedding::EmbeddingModel;
use crate::vector_store::flat::FlatIndexStore;

pub const STUB_DIMENSIONS: usize = 256;

/// Bag-of-words embedding: each lowercase word increments one hashed bucket.
#[derive(Default)]
pub struct StubEmbedding {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl StubEmbedding {
    pub fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; STUB_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[fnv1a(&word.to_lowercase()) as usize % STUB_DIMENSIONS] += 1.0;
        }
        vector
    }

    fn check(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("OpenAI embedding API error (500 Internal Server Error): stub failure");
        }
        Ok(())
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingModel for StubEmbedding {
    async fn embed_for_ingestion(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.check()?;
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    async fn embed_for_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        self.check()?;
        Ok(Self::embed(query))
    }

    fn dimensions(&self) -> u32 {
        STUB_DIMENSIONS as u32
    }
}

/// Completion model that answers with the user prompt it received.
#[derive(Default)]
pub struct StubCompletion {
    pub calls: Mutex<Vec<Vec<Message>>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl CompletionModel for StubCompletion {
    async fn complete(
        &self,
        messages: &[Message],
        _max_tokens: Option<u32>,
        _temperature: Option<f64>,
    ) -> anyhow::Result<CompletionResult> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("OpenAI completion API error (503 Service Unavailable): stub failure");
        }
        let content = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(CompletionResult {
            content,
            usage: None,
        })
    }
}

pub fn test_settings(root: &Path, chunk_size: usize, chunk_overlap: usize) -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        allowed_origins: vec!["http://localhost:5173".to_string()],
        openai_api_key: "sk-test".to_string(),
        openai_base_url: "http://127.0.0.1:1".to_string(),
        embedding_model: "stub".to_string(),
        vector_dimensions: STUB_DIMENSIONS as u32,
        embedding_batch_size: 100,
        completion_model: "stub".to_string(),
        max_tokens: None,
        temperature: None,
        system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        chunk_size,
        chunk_overlap,
        pdftotext_bin: "pdftotext".to_string(),
        top_k: 2,
        source_path: root.join("knowledge.txt"),
        data_dir: root.join("data"),
    }
}

/// Write `document` as the source and build state over stub models.
pub fn state_with_document(
    root: &Path,
    document: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> (AppState, Arc<StubEmbedding>, Arc<StubCompletion>) {
    let settings = test_settings(root, chunk_size, chunk_overlap);
    std::fs::write(&settings.source_path, document).unwrap();

    let embedding = Arc::new(StubEmbedding::default());
    let completion = Arc::new(StubCompletion::default());
    let store = Arc::new(FlatIndexStore::new(&settings.data_dir));
    let state = AppState::new(settings, store, embedding.clone(), completion.clone());
    (state, embedding, completion)
}
