//! Indexing of reference reports into the Supabase `reference_reports` table
//!
//! Every `*.docx` in the reference directory is flattened to text, embedded
//! and inserted as one row. The retriever later queries the same table
//! through the `match_reference_reports` RPC.

use indicatif::ProgressBar;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::ingestion::parser::docx_paragraphs;
use crate::providers::EmbeddingProvider;
use crate::template::style::reference_docx_files;

/// Reports with less text than this are not worth indexing
pub const MIN_CONTENT_CHARS: usize = 100;

/// Default table holding the indexed reports
pub const REFERENCE_TABLE: &str = "reference_reports";

/// One row of the reference table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    pub title: String,
    pub date: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// What happened to a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    TooShort,
}

/// Totals for a directory run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Non-empty paragraphs, trimmed and joined with newlines
pub fn extract_report_text(data: &[u8]) -> std::result::Result<String, String> {
    let paragraphs = docx_paragraphs(data)?;
    Ok(paragraphs
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// `sinistro_ACME_2023` becomes `Sinistro acme 2023`
pub fn title_from_stem(stem: &str) -> String {
    let spaced = stem.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Supabase REST client for the reference table
pub struct ReferenceTable {
    client: Client,
    table_url: String,
    service_key: String,
}

impl ReferenceTable {
    pub fn new(
        config: &RetrievalConfig,
        url: &str,
        table: &str,
        service_key: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{}", url.trim_end_matches('/'), table),
            service_key: service_key.into(),
        })
    }

    pub async fn insert(&self, record: &ReferenceRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.table_url)
            .header("apikey", &self.service_key)
            .header("Prefer", "return=minimal")
            .bearer_auth(&self.service_key)
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!("Reference insert failed ({}): {}", status, body)));
        }
        Ok(())
    }
}

/// Embeds reference reports and stores them in the vector table
pub struct ReferenceIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    table: ReferenceTable,
    date: String,
}

impl ReferenceIndexer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, table: ReferenceTable) -> Self {
        Self {
            embedder,
            table,
            date: chrono::Local::now().date_naive().to_string(),
        }
    }

    /// Stamp rows with a fixed date instead of today
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub async fn index_file(&self, path: &Path) -> Result<IndexOutcome> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = tokio::fs::read(path).await?;
        let content = extract_report_text(&data).map_err(|e| Error::extraction(&name, e))?;

        if content.chars().count() < MIN_CONTENT_CHARS {
            tracing::info!("Skipping {}: too short", name);
            return Ok(IndexOutcome::TooShort);
        }

        let embedding = self.embedder.embed(&content).await?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = ReferenceRecord {
            title: title_from_stem(&stem),
            date: self.date.clone(),
            content,
            embedding,
        };
        self.table.insert(&record).await?;

        tracing::info!("Indexed {} ({} dimensions)", name, record.embedding.len());
        Ok(IndexOutcome::Indexed)
    }

    /// Index every report in `dir`; a failing file is counted and skipped.
    pub async fn index_dir(&self, dir: &Path, progress: &ProgressBar) -> Result<IndexSummary> {
        let files = reference_docx_files(dir).map_err(|e| {
            Error::Config(format!("Cannot read reference directory {}: {}", dir.display(), e))
        })?;
        progress.set_length(files.len() as u64);

        let mut summary = IndexSummary::default();
        for path in &files {
            if let Some(name) = path.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
            match self.index_file(path).await {
                Ok(IndexOutcome::Indexed) => summary.indexed += 1,
                Ok(IndexOutcome::TooShort) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!("Failed to index {}: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        tracing::info!(
            "Indexing finished: {} indexed, {} skipped, {} failed",
            summary.indexed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }
}
