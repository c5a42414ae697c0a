//! Embedding provider trait and the Hugging Face inference implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};

const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction";

/// Trait for generating text embeddings
///
/// Implementations:
/// - `HuggingFaceEmbedder`: hosted feature-extraction pipeline (all-MiniLM-L6-v2)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimensions (384 for all-MiniLM-L6-v2)
    fn dimensions(&self) -> usize;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Hugging Face feature-extraction client
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    token: String,
    model: String,
}

#[derive(Serialize)]
struct FeatureRequest<'a> {
    inputs: &'a str,
    options: FeatureOptions,
}

#[derive(Serialize)]
struct FeatureOptions {
    wait_for_model: bool,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &RetrievalConfig, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/{}", HF_INFERENCE_URL, config.embedding_model),
            token: token.into(),
            model: config.embedding_model.clone(),
        })
    }

    /// Point the client at a different feature-extraction endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// The pipeline answers `[f32]` for a sentence or `[[f32]]` for a batch; take the first row.
fn first_vector(value: Value) -> Result<Vec<f32>> {
    let row = match value {
        Value::Array(items) if items.first().map(Value::is_array).unwrap_or(false) => {
            items.into_iter().next().unwrap_or(Value::Null)
        }
        other => other,
    };

    let vector: Vec<f32> = serde_json::from_value(row)
        .map_err(|e| Error::Internal(format!("Unexpected embedding response: {}", e)))?;
    if vector.is_empty() {
        return Err(Error::Internal("Empty embedding returned".to_string()));
    }
    Ok(vector)
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = FeatureRequest {
            inputs: text,
            options: FeatureOptions { wait_for_model: true },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!("Embedding API error ({}): {}", status, body)));
        }

        first_vector(response.json().await?)
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_vector_shapes() {
        assert_eq!(first_vector(json!([0.5, 1.0])).unwrap(), vec![0.5, 1.0]);
        assert_eq!(first_vector(json!([[0.1, 0.2], [0.3, 0.4]])).unwrap(), vec![0.1, 0.2]);
        assert!(first_vector(json!([])).is_err());
        assert!(first_vector(json!({"error": "loading"})).is_err());
    }

    #[tokio::test]
    async fn test_embed_against_local_endpoint() {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route(
            "/embed",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["options"]["wait_for_model"], true);
                Json(json!([[0.25, 0.75]]))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let embedder = HuggingFaceEmbedder::new(&RetrievalConfig::default(), "hf-token")
            .unwrap()
            .with_endpoint(format!("http://{}/embed", addr));
        assert_eq!(embedder.embed("testo").await.unwrap(), vec![0.25, 0.75]);
    }
}
