//! LLM provider trait for prompt completion

use async_trait::async_trait;

use crate::error::Result;

/// Trait for chat-completion backends
///
/// Implementations:
/// - `OpenAiCompatibleClient`: OpenRouter or any OpenAI-compatible endpoint
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a prompt and return the trimmed text of the first choice
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Check if the provider is reachable with the configured credentials
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
