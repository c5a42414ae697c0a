//! Upload validation and text extraction
//!
//! Files are validated as a batch, then extracted concurrently: document
//! formats on blocking threads, images through tesseract.

pub mod ocr;
pub mod parser;
pub mod validation;

pub use ocr::OcrEngine;
pub use parser::{FileKind, FileParser};
pub use validation::{validate_batch, UploadedFile, ALLOWED_EXTENSIONS};

use validation::expected_mime;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};

/// Marker appended to a corpus cut at the character limit
pub const TRUNCATION_MARKER: &str = "\n\n[TESTO TRONCATO PER LIMITE TOKEN]";

/// Truncate a corpus to `max_chars` characters, marking the cut
pub fn guard_corpus(corpus: String, max_chars: usize) -> String {
    match corpus.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::warn!(
                "Corpus exceeds {} chars, truncating",
                max_chars
            );
            let mut truncated = corpus[..byte_idx].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => corpus,
    }
}

/// Validates uploads and builds the text corpus
#[derive(Debug, Clone)]
pub struct Extractor {
    limits: ExtractionConfig,
    ocr: OcrEngine,
}

impl Extractor {
    pub fn new(limits: ExtractionConfig) -> Self {
        let ocr = OcrEngine::new(limits.ocr_language.clone()).with_binary(limits.ocr_binary.clone());
        Self { limits, ocr }
    }

    /// Replace the OCR engine
    pub fn with_ocr(mut self, ocr: OcrEngine) -> Self {
        self.ocr = ocr;
        self
    }

    /// Validate every file, extract them concurrently and join the texts.
    ///
    /// The first extraction error is returned; empty texts are skipped.
    pub async fn extract_corpus(&self, files: &[UploadedFile], request_id: &str) -> Result<String> {
        validate_batch(files, &self.limits, request_id)?;

        if files.is_empty() {
            tracing::info!("[{}] No files provided for processing", request_id);
            return Ok(String::new());
        }

        let total: usize = files.iter().map(|f| f.data.len()).sum();
        tracing::info!(
            "[{}] All files validated. Total size: {} bytes. Processing {} items.",
            request_id,
            total,
            files.len()
        );

        let tasks = files.iter().map(|file| self.extract_single(file, request_id));
        let results = join_all(tasks).await;

        let mut texts = Vec::with_capacity(results.len());
        for result in results {
            let text = result?;
            if !text.trim().is_empty() {
                texts.push(text);
            }
        }

        let corpus = guard_corpus(texts.join("\n\n"), self.limits.max_prompt_chars);
        tracing::info!("[{}] Corpus extracted: {} chars", request_id, corpus.chars().count());
        Ok(corpus)
    }

    /// Base64 data URIs for the first `max_images_in_report` image uploads
    pub fn image_tokens(&self, files: &[UploadedFile]) -> Vec<String> {
        files
            .iter()
            .filter(|f| FileKind::from_filename(&f.filename).map(|k| k.needs_ocr()).unwrap_or(false))
            .take(self.limits.max_images_in_report)
            .filter_map(|f| {
                let mime = expected_mime(&f.extension())?;
                Some(format!("data:{};base64,{}", mime, STANDARD.encode(&f.data)))
            })
            .collect()
    }

    async fn extract_single(&self, file: &UploadedFile, request_id: &str) -> Result<String> {
        let kind = FileKind::from_filename(&file.filename)
            .ok_or_else(|| Error::UnsupportedFileType(file.filename.clone()))?;

        tracing::info!(
            "[{}] Extracting content from file: {} ({:?})",
            request_id,
            file.filename,
            kind
        );

        let text = if kind.needs_ocr() {
            self.ocr
                .recognize(&file.filename, &file.data, request_id)
                .await
                .map_err(|e| match e {
                    Error::Ocr(msg) => Error::extraction(&file.filename, msg),
                    other => other,
                })?
        } else {
            let filename = file.filename.clone();
            let data = file.data.clone();
            tokio::task::spawn_blocking(move || FileParser::parse(&filename, &data))
                .await
                .map_err(|e| Error::extraction(&file.filename, format!("extraction task failed: {}", e)))??
        };

        tracing::debug!(
            "[{}] Extracted from {}: text={} chars",
            request_id,
            file.filename,
            text.len()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_docx;

    #[test]
    fn test_guard_corpus() {
        assert_eq!(guard_corpus("short".to_string(), 10), "short");
        assert_eq!(guard_corpus("exact".to_string(), 5), "exact");

        let guarded = guard_corpus("àèìòù-extra".to_string(), 5);
        assert_eq!(guarded, format!("àèìòù{}", TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_extract_corpus_joins_documents() {
        let extractor = Extractor::new(ExtractionConfig::default());
        let files = vec![
            UploadedFile::new("a.docx", build_docx(&["Primo documento"])),
            UploadedFile::new("b.docx", build_docx(&[""])),
            UploadedFile::new("c.docx", build_docx(&["Secondo documento"])),
        ];

        let corpus = extractor.extract_corpus(&files, "t").await.unwrap();
        assert_eq!(corpus, "Primo documento\n\nSecondo documento");
    }

    #[tokio::test]
    async fn test_extract_corpus_truncates() {
        let limits = ExtractionConfig {
            max_prompt_chars: 6,
            ..ExtractionConfig::default()
        };
        let extractor = Extractor::new(limits);
        let files = vec![UploadedFile::new("a.docx", build_docx(&["Perizia tecnica"]))];

        let corpus = extractor.extract_corpus(&files, "t").await.unwrap();
        assert_eq!(corpus, format!("Perizi{}", TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_extract_corpus_validation_error() {
        let extractor = Extractor::new(ExtractionConfig::default());
        let files = vec![UploadedFile::new("a.pdf", b"plain text, not a pdf".to_vec())];
        let err = extractor.extract_corpus(&files, "t").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_image_tokens_capped() {
        let limits = ExtractionConfig {
            max_images_in_report: 1,
            ..ExtractionConfig::default()
        };
        let extractor = Extractor::new(limits);
        let files = vec![
            UploadedFile::new("a.docx", build_docx(&["x"])),
            UploadedFile::new("foto1.PNG", vec![1u8, 2, 3]),
            UploadedFile::new("foto2.jpg", vec![4u8]),
        ];

        assert_eq!(extractor.image_tokens(&files), vec!["data:image/png;base64,AQID".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_corpus_empty_batch() {
        let extractor = Extractor::new(ExtractionConfig::default());
        assert_eq!(extractor.extract_corpus(&[], "t").await.unwrap(), "");
    }
}
