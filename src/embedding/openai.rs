use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingModel;

/// OpenAI embedding model via API.
pub struct OpenAIEmbeddingModel {
    model_name: String,
    api_key: String,
    base_url: String,
    dimensions: u32,
    http_client: reqwest::Client,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAIEmbeddingModel {
    pub fn new(
        model_name: &str,
        api_key: &str,
        base_url: &str,
        dimensions: u32,
        batch_size: usize,
    ) -> Self {
        Self {
            model_name: model_name.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            dimensions,
            http_client: reqwest::Client::new(),
            batch_size: batch_size.max(1),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.model_name.clone(),
            input: texts.to_vec(),
        };

        let resp = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embedding API error ({status}): {body}");
        }

        let mut response: EmbeddingResponse = resp.json().await?;
        if response.data.len() != texts.len() {
            anyhow::bail!(
                "OpenAI embedding API returned {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            );
        }

        // The API documents `index`; when present it must be a permutation of 0..n.
        if response.data.iter().any(|d| d.index.is_some()) {
            response.data.sort_by_key(|d| d.index);
            if !response
                .data
                .iter()
                .enumerate()
                .all(|(i, d)| d.index == Some(i))
            {
                let indices: Vec<Option<usize>> = response.data.iter().map(|d| d.index).collect();
                anyhow::bail!("OpenAI embedding API returned invalid indices {indices:?}");
            }
        }

        let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        for emb in &embeddings {
            if emb.len() != self.dimensions as usize {
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    emb.len()
                );
            }
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingModel for OpenAIEmbeddingModel {
    async fn embed_for_ingestion(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Embedding batch {} ({} texts)", i + 1, batch.len());
            let embeddings = self.embed_batch(batch).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    async fn embed_for_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        let results = self.embed_batch(&[query.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned for query"))
    }

    fn dimensions(&self) -> u32 {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedding_body(vectors: &[Vec<f32>]) -> serde_json::Value {
        let data: Vec<serde_json::Value> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| serde_json::json!({"object": "embedding", "index": i, "embedding": v}))
            .collect();
        serde_json::json!({
            "object": "list",
            "data": data,
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 2, "total_tokens": 2}
        })
    }

    #[test]
    fn test_embedding_request_serialization() {
        let req = EmbeddingRequest {
            model: "text-embedding-3-small".to_string(),
            input: vec!["hello world".to_string()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"][0], "hello world");
    }

    #[tokio::test]
    async fn test_embed_for_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.1, 0.2, 0.3]])))
            .expect(1)
            .mount(&server)
            .await;

        let model = OpenAIEmbeddingModel::new(
            "text-embedding-3-small",
            "sk-test",
            &format!("{}/v1/", server.uri()),
            3,
            100,
        );
        let vector = model.embed_for_query("what is covered?").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_for_ingestion_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(embedding_body(&[vec![1.0, 0.0], vec![0.0, 1.0]])),
            )
            .expect(2)
            .mount(&server)
            .await;

        let model = OpenAIEmbeddingModel::new("m", "sk-test", &server.uri(), 2, 2);
        let texts: Vec<String> = (0..4).map(|i| format!("chunk {i}")).collect();
        let vectors = model.embed_for_ingestion(&texts).await.unwrap();
        assert_eq!(vectors.len(), 4);
        assert_eq!(vectors[2], vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embedding_orders_by_index() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let model = OpenAIEmbeddingModel::new("m", "sk-test", &server.uri(), 2, 10);
        let vectors = model
            .embed_for_ingestion(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_embedding_rejects_duplicate_indices() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 1, "embedding": [1.0, 0.0]}
            ]
        });
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let model = OpenAIEmbeddingModel::new("m", "sk-test", &server.uri(), 2, 10);
        let err = model
            .embed_for_ingestion(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid indices"), "{err}");
    }

    #[tokio::test]
    async fn test_embedding_api_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let model = OpenAIEmbeddingModel::new("m", "bad", &server.uri(), 3, 10);
        let err = model.embed_for_query("hi").await.unwrap_err().to_string();
        assert!(err.contains("401"), "{err}");
        assert!(err.contains("invalid api key"), "{err}");
    }

    #[tokio::test]
    async fn test_embedding_dimension_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.5; 4]])))
            .mount(&server)
            .await;

        let model = OpenAIEmbeddingModel::new("m", "sk-test", &server.uri(), 3, 10);
        let err = model.embed_for_query("hi").await.unwrap_err().to_string();
        assert!(err.contains("dimension mismatch"), "{err}");
    }
}
