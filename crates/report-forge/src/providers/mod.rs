//! Provider abstractions for the language model, embeddings and similar-case retrieval
//!
//! Trait-based seams let the server run against OpenRouter and Supabase in
//! production and against scripted doubles in tests.

pub mod embedding;
pub mod llm;
pub mod openai;
pub mod retrieval;

pub use embedding::{EmbeddingProvider, HuggingFaceEmbedder};
pub use llm::LlmProvider;
pub use openai::OpenAiCompatibleClient;
pub use retrieval::{NoopRetriever, SimilarCase, SimilarCaseRetriever, SupabaseRetriever};
