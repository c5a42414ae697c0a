//! Similar-case retrieval over previously indexed reference reports

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;

/// A reference report close to the current case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content_snippet: String,
}

/// Trait for looking up similar past reports
#[async_trait]
pub trait SimilarCaseRetriever: Send + Sync {
    /// Return at most `k` cases similar to `text`
    async fn retrieve(&self, text: &str, k: usize) -> Result<Vec<SimilarCase>>;
}

/// Retriever used when no vector store is configured
#[derive(Debug, Default)]
pub struct NoopRetriever;

#[async_trait]
impl SimilarCaseRetriever for NoopRetriever {
    async fn retrieve(&self, _text: &str, _k: usize) -> Result<Vec<SimilarCase>> {
        Ok(Vec::new())
    }
}

/// Least-recently-used embedding cache keyed by the SHA-256 of the text.
/// A capacity of zero disables caching.
struct EmbeddingCache {
    entries: Option<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    fn key(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    fn get(&mut self, key: &str) -> Option<Vec<f32>> {
        self.entries.as_mut()?.get(key).cloned()
    }

    fn insert(&mut self, key: String, embedding: Vec<f32>) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(key, embedding);
        }
    }

    fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    k: usize,
}

/// Supabase `match_reference_reports` RPC backed retriever
pub struct SupabaseRetriever {
    client: Client,
    rpc_url: String,
    anon_key: String,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Mutex<EmbeddingCache>,
}

impl SupabaseRetriever {
    pub fn new(
        config: &RetrievalConfig,
        url: &str,
        anon_key: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rpc_url: format!("{}/rest/v1/rpc/{}", url.trim_end_matches('/'), config.rpc_name),
            anon_key: anon_key.into(),
            embedder,
            cache: Mutex::new(EmbeddingCache::new(config.embedding_cache_size)),
        })
    }

    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        let key = EmbeddingCache::key(text);
        if let Some(hit) = self.cache.lock().get(&key) {
            tracing::debug!("Embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.embedder.embed(text).await?;
        if embedding.len() != self.embedder.dimensions() {
            tracing::warn!(
                "Embedding from {} has {} dimensions, expected {}",
                self.embedder.name(),
                embedding.len(),
                self.embedder.dimensions()
            );
        }
        self.cache.lock().insert(key, embedding.clone());
        Ok(embedding)
    }
}

#[async_trait]
impl SimilarCaseRetriever for SupabaseRetriever {
    async fn retrieve(&self, text: &str, k: usize) -> Result<Vec<SimilarCase>> {
        let embedding = self.embed_cached(text).await?;

        let response = self
            .client
            .post(&self.rpc_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .json(&MatchRequest {
                query_embedding: &embedding,
                k,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!("Similar case lookup failed ({}): {}", status, body)));
        }

        let rows: Option<Vec<SimilarCase>> = response.json().await?;
        let mut rows = rows.unwrap_or_default();
        rows.truncate(k);
        tracing::info!("Retrieved {} similar cases", rows.len());
        Ok(rows)
    }
}
