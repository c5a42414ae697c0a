//! Configuration for the report generation backend
//!
//! Values come from `ReportConfig::default()`, optionally overlaid by a TOML file
//! (`REPORT_FORGE_CONFIG`) and finally by individual environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default list of CORS allowed origins
const DEFAULT_CORS_ORIGINS: [&str; 5] = [
    "https://aiperito.vercel.app",
    "http://localhost:3000",
    "http://localhost:8000",
    "https://localhost:3000",
    "https://localhost:8000",
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// LLM (OpenAI-compatible) configuration
    pub llm: LlmConfig,
    /// Upload and extraction limits
    pub extraction: ExtractionConfig,
    /// Template and style reference configuration
    pub template: TemplateConfig,
    /// Similar-case retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Scratch directory cleanup
    pub cleanup: CleanupConfig,
    /// Fields that trigger a clarification round-trip when missing
    pub clarification: ClarificationConfig,
}

impl ReportConfig {
    /// Load configuration from the optional TOML file and the environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("REPORT_FORGE_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Overlay values from an environment lookup
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("HOST") {
            self.server.host = v;
        }
        if let Some(v) = non_empty("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = non_empty("API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = non_empty("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = parse_origins(&v);
        }

        if let Some(v) = non_empty("OPENROUTER_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = non_empty("MODEL_ID") {
            self.llm.model_id = v;
        }
        if let Some(v) = non_empty("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = non_empty("ALLOW_VISION").and_then(|v| v.parse().ok()) {
            self.llm.allow_vision = v;
        }

        if let Some(v) = non_empty("MAX_PROMPT_CHARS").and_then(|v| v.parse().ok()) {
            self.extraction.max_prompt_chars = v;
        }
        if let Some(v) = non_empty("MAX_TOTAL_PROMPT_CHARS").and_then(|v| v.parse().ok()) {
            self.extraction.max_total_prompt_chars = v;
        }
        if let Some(v) = non_empty("MAX_IMAGES_IN_REPORT").and_then(|v| v.parse().ok()) {
            self.extraction.max_images_in_report = v;
        }
        if let Some(v) = non_empty("OCR_LANGUAGE") {
            self.extraction.ocr_language = v;
        }
        if let Some(v) = non_empty("TESSERACT_CMD") {
            self.extraction.ocr_binary = v;
        }

        if let Some(v) = non_empty("TEMPLATE_PATH") {
            self.template.template_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("REFERENCE_DIR") {
            self.template.reference_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("MAX_STYLE_PARAS").and_then(|v| v.parse().ok()) {
            self.template.max_style_paragraphs = v;
        }

        if let Some(v) = non_empty("SUPABASE_URL") {
            self.retrieval.supabase_url = Some(v);
        }
        if let Some(v) = non_empty("SUPABASE_ANON_KEY") {
            self.retrieval.supabase_key = Some(v);
        }
        if let Some(v) = non_empty("HF_API_TOKEN").or_else(|| non_empty("HUGGINGFACEHUB_API_TOKEN")) {
            self.retrieval.hf_api_token = Some(v);
        }

        if let Some(v) = non_empty("CLEANUP_TTL").and_then(|v| v.parse().ok()) {
            self.cleanup.ttl_secs = v;
        }
        if let Some(v) = non_empty("SCRATCH_DIR") {
            self.cleanup.scratch_dir = PathBuf::from(v);
        }
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.extraction.max_prompt_chars == 0 || self.extraction.max_total_prompt_chars == 0 {
            return Err(Error::Config("prompt character limits must be positive".to_string()));
        }
        if self.llm.max_attempts == 0 {
            return Err(Error::Config("llm.max_attempts must be at least 1".to_string()));
        }
        if self.server.require_api_key && self.server.api_key.is_none() {
            tracing::error!(
                "CRITICAL: API key security is enforced, but no API_KEY is configured. \
                 All API requests requiring this key will be denied."
            );
        }
        Ok(())
    }
}

/// Split a comma-separated origin list
fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.is_empty() {
        default_cors_origins()
    } else {
        origins
    }
}

fn default_cors_origins() -> Vec<String> {
    DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Origins allowed by CORS
    pub cors_allowed_origins: Vec<String>,
    /// Key expected in the `X-API-Key` header
    pub api_key: Option<String>,
    /// Enforce the API key on `/api` routes
    pub require_api_key: bool,
    /// Maximum request body size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: default_cors_origins(),
            api_key: None,
            require_api_key: true,
            max_upload_size: 100 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// `host:port` string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// LLM configuration (OpenRouter or any OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL (without `/chat/completions`)
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Model identifier
    pub model_id: String,
    /// Value of the `HTTP-Referer` header
    pub referer: String,
    /// Value of the `X-Title` header
    pub title: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Total attempts for retryable failures
    pub max_attempts: u32,
    /// Lower bound of the retry backoff
    pub backoff_min_secs: u64,
    /// Upper bound of the retry backoff
    pub backoff_max_secs: u64,
    /// Attach image tokens to the base prompt
    pub allow_vision: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model_id: "meta-llama/llama-4-maverick:free".to_string(),
            referer: "http://localhost".to_string(),
            title: "bot-perito".to_string(),
            timeout_secs: 300,
            max_attempts: 3,
            backoff_min_secs: 2,
            backoff_max_secs: 10,
            allow_vision: false,
        }
    }
}

/// Upload and extraction limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Per-file size limit in bytes (default: 25MB)
    pub max_file_size: usize,
    /// Total upload size limit in bytes (default: 100MB)
    pub max_total_size: usize,
    /// Maximum number of files per request
    pub max_files: usize,
    /// Corpus length before truncation
    pub max_prompt_chars: usize,
    /// Maximum length of an assembled prompt
    pub max_total_prompt_chars: usize,
    /// Maximum number of images forwarded to the report
    pub max_images_in_report: usize,
    /// Tesseract language code
    pub ocr_language: String,
    /// Tesseract executable
    pub ocr_binary: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_size: 25 * 1024 * 1024,
            max_total_size: 100 * 1024 * 1024,
            max_files: 20,
            max_prompt_chars: 4_000_000,
            max_total_prompt_chars: 4_000_000,
            max_images_in_report: 10,
            ocr_language: "ita".to_string(),
            ocr_binary: "tesseract".to_string(),
        }
    }
}

/// Template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// DOCX template with `{{TAG}}` placeholders
    pub template_path: PathBuf,
    /// Directory with reference reports used as style samples
    pub reference_dir: PathBuf,
    /// Paragraphs taken from each reference report
    pub max_style_paragraphs: usize,
    /// Paragraphs of the template used as the prompt excerpt
    pub excerpt_paragraphs: usize,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("app/templates/template.docx"),
            reference_dir: PathBuf::from("app/templates/reference"),
            max_style_paragraphs: 8,
            excerpt_paragraphs: 8,
        }
    }
}

/// Similar-case retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Supabase project URL; retrieval is disabled when unset
    pub supabase_url: Option<String>,
    /// Read-only Supabase key
    pub supabase_key: Option<String>,
    /// Supabase RPC performing the vector match
    pub rpc_name: String,
    /// Number of similar cases to fetch
    pub top_k: usize,
    /// Hugging Face inference token for embeddings
    pub hf_api_token: Option<String>,
    /// Hugging Face embedding model
    pub embedding_model: String,
    /// Cached embeddings kept in memory
    pub embedding_cache_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            rpc_name: "match_reference_reports".to_string(),
            top_k: 3,
            hf_api_token: None,
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_cache_size: 128,
            timeout_secs: 60,
        }
    }
}

impl RetrievalConfig {
    /// Retrieval needs both the vector store and the embedding endpoint
    pub fn is_enabled(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_key.is_some() && self.hf_api_token.is_some()
    }
}

/// Scratch directory cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Directory holding per-request scratch files
    pub scratch_dir: PathBuf,
    /// Age in seconds after which items are removed
    pub ttl_secs: u64,
    /// Interval between cleanup sweeps
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("report-forge"),
            ttl_secs: 900,
            interval_secs: 300,
        }
    }
}

/// A field whose absence triggers a clarification question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticalField {
    pub key: String,
    pub label: String,
    pub question: String,
}

impl CriticalField {
    fn new(key: &str, label: &str, question: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            question: question.to_string(),
        }
    }
}

/// Clarification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClarificationConfig {
    /// Fields checked after the base-context extraction, in order
    pub critical_fields: Vec<CriticalField>,
}

impl Default for ClarificationConfig {
    fn default() -> Self {
        Self {
            critical_fields: vec![
                CriticalField::new("polizza", "Numero Polizza", "Qual è il numero di polizza?"),
                CriticalField::new(
                    "data_danno",
                    "Data Danno",
                    "Qual è la data esatta del danno (GG/MM/AAAA)?",
                ),
                CriticalField::new("client", "Cliente", "Qual è la ragione sociale del cliente?"),
                CriticalField::new(
                    "assicurato",
                    "Assicurato",
                    "Qual è la ragione sociale dell'assicurato?",
                ),
                CriticalField::new("luogo", "Luogo Sinistro", "Dove è avvenuto esattamente il sinistro?"),
                CriticalField::new("cause", "Causa Sinistro", "Qual è la causa presunta del sinistro?"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReportConfig::default();
        assert_eq!(config.llm.model_id, "meta-llama/llama-4-maverick:free");
        assert_eq!(config.cleanup.ttl_secs, 900);
        assert_eq!(config.extraction.max_prompt_chars, 4_000_000);
        assert_eq!(config.extraction.ocr_language, "ita");
        assert_eq!(config.server.cors_allowed_origins.len(), 5);
        assert_eq!(config.clarification.critical_fields.len(), 6);
        assert_eq!(config.clarification.critical_fields[0].key, "polizza");
        assert!(!config.retrieval.is_enabled());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ReportConfig::default();
        config.apply_env(env(&[
            ("MODEL_ID", "test-model"),
            ("CLEANUP_TTL", "60"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("API_KEY", "secret"),
            ("MAX_PROMPT_CHARS", "not-a-number"),
        ]));

        assert_eq!(config.llm.model_id, "test-model");
        assert_eq!(config.cleanup.ttl_secs, 60);
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        // Unparseable values keep the default
        assert_eq!(config.extraction.max_prompt_chars, 4_000_000);
    }

    #[test]
    fn test_blank_cors_falls_back_to_defaults() {
        let mut config = ReportConfig::default();
        config.apply_env(env(&[("CORS_ALLOWED_ORIGINS", " , ")]));
        assert_eq!(config.server.cors_allowed_origins.len(), 5);
        assert_eq!(parse_origins(","), default_cors_origins());
    }

    #[test]
    fn test_toml_partial_sections() {
        let raw = r#"
            [llm]
            model_id = "from-file"

            [extraction]
            max_files = 3
        "#;
        let config: ReportConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.llm.model_id, "from-file");
        assert_eq!(config.llm.max_attempts, 3);
        assert_eq!(config.extraction.max_files, 3);
        assert_eq!(config.extraction.max_file_size, 25 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ReportConfig::default();
        config.extraction.max_prompt_chars = 0;
        assert!(config.validate().is_err());
    }
}
