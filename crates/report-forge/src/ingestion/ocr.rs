//! Image OCR through the `tesseract` binary

use std::io::Write;
use std::path::PathBuf;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Runs tesseract on image bytes
#[derive(Debug, Clone)]
pub struct OcrEngine {
    binary: String,
    language: String,
    scratch_dir: Option<PathBuf>,
}

impl OcrEngine {
    /// Create an engine for a tesseract language code (e.g. `ita`)
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: language.into(),
            scratch_dir: None,
        }
    }

    /// Use a specific tesseract executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Write temporary images under `dir` instead of the system temp dir
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Recognize text in an image.
    ///
    /// An image without text yields an empty string.
    pub async fn recognize(&self, filename: &str, data: &[u8], request_id: &str) -> Result<String> {
        tracing::info!("[{}] Processing image file: {}", request_id, filename);

        let suffix = crate::ingestion::validation::extension_of(filename);
        let mut builder = tempfile::Builder::new();
        builder.prefix("report-forge-ocr-").suffix(&suffix);
        let mut image = match &self.scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        image.write_all(data)?;
        image.flush()?;

        let output = Command::new(&self.binary)
            .arg(image.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .await
            .map_err(|e| Error::Ocr(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!("tesseract error on {}: {}", filename, stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().is_empty() {
            tracing::info!("[{}] No OCR text found in {}", request_id, filename);
            return Ok(String::new());
        }

        tracing::debug!("[{}] OCR extracted {} chars from {}", request_id, text.trim().len(), filename);
        Ok(text)
    }
}
