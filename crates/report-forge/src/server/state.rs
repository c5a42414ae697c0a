//! Application state for the report server

use std::sync::Arc;

use crate::config::ReportConfig;
use crate::error::Result;
use crate::generation::ReportGenerator;
use crate::providers::{
    HuggingFaceEmbedder, LlmProvider, NoopRetriever, OpenAiCompatibleClient, SimilarCaseRetriever,
    SupabaseRetriever,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ReportConfig,
    /// Extraction, LLM steps and template rendering
    generator: Arc<ReportGenerator>,
}

impl AppState {
    /// Create application state with the configured providers
    pub async fn new(config: ReportConfig) -> Result<Self> {
        tracing::info!("Initializing report application state...");

        let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleClient::new(&config.llm)?);
        tracing::info!("LLM client initialized (model: {})", llm.model());

        match llm.health_check().await {
            Ok(true) => tracing::info!("{} endpoint reachable", llm.name()),
            Ok(false) => tracing::warn!("{} endpoint rejected the health check", llm.name()),
            Err(e) => tracing::warn!("{} endpoint not available: {}", llm.name(), e),
        }

        let retriever = Self::build_retriever(&config)?;

        Ok(Self::with_providers(config, llm, retriever))
    }

    /// Create application state around explicit providers
    pub fn with_providers(
        config: ReportConfig,
        llm: Arc<dyn LlmProvider>,
        retriever: Arc<dyn SimilarCaseRetriever>,
    ) -> Self {
        let generator = Arc::new(ReportGenerator::new(&config, llm, retriever));
        Self {
            inner: Arc::new(AppStateInner { config, generator }),
        }
    }

    fn build_retriever(config: &ReportConfig) -> Result<Arc<dyn SimilarCaseRetriever>> {
        let retrieval = &config.retrieval;
        match (&retrieval.supabase_url, &retrieval.supabase_key, &retrieval.hf_api_token) {
            (Some(url), Some(key), Some(token)) => {
                let embedder = Arc::new(HuggingFaceEmbedder::new(retrieval, token.clone())?);
                let retriever = SupabaseRetriever::new(retrieval, url, key.clone(), embedder)?;
                tracing::info!("Similar case retrieval enabled ({})", url);
                Ok(Arc::new(retriever))
            }
            _ => {
                tracing::info!("Similar case retrieval disabled (Supabase or HF token not configured)");
                Ok(Arc::new(NoopRetriever))
            }
        }
    }

    /// Get configuration
    pub fn config(&self) -> &ReportConfig {
        &self.inner.config
    }

    /// Get the report generator
    pub fn generator(&self) -> &Arc<ReportGenerator> {
        &self.inner.generator
    }
}
