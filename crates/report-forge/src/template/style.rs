//! Reference report style samples

use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::ingestion::parser::docx_paragraphs;

use super::style_reference::PREDEFINED_STYLE_REFERENCE_TEXT;

/// Loads style samples from a directory of reference reports, once per process
#[derive(Debug)]
pub struct StyleLoader {
    reference_dir: PathBuf,
    max_paragraphs: usize,
    cached: OnceCell<String>,
}

impl StyleLoader {
    pub fn new(reference_dir: impl Into<PathBuf>, max_paragraphs: usize) -> Self {
        Self {
            reference_dir: reference_dir.into(),
            max_paragraphs,
            cached: OnceCell::new(),
        }
    }

    /// Style samples, or the built-in reference when no samples are found
    pub async fn reference_style_text(&self) -> String {
        let samples = self
            .cached
            .get_or_init(|| async {
                let dir = self.reference_dir.clone();
                let max = self.max_paragraphs;
                match tokio::task::spawn_blocking(move || load_style_samples(&dir, max)).await {
                    Ok(samples) => samples,
                    Err(e) => {
                        tracing::warn!("Style sample loading task failed: {}", e);
                        String::new()
                    }
                }
            })
            .await;

        if samples.is_empty() {
            PREDEFINED_STYLE_REFERENCE_TEXT.to_string()
        } else {
            samples.clone()
        }
    }
}

/// Join the first paragraphs of every `*.docx` in `dir`, sorted by name.
///
/// A missing directory yields an empty string; unreadable files are skipped.
pub fn load_style_samples(dir: &Path, max_paragraphs: usize) -> String {
    let files = match reference_docx_files(dir) {
        Ok(files) => files,
        Err(_) => {
            tracing::debug!("Reference directory {} not found", dir.display());
            return String::new();
        }
    };

    let mut chunks = Vec::new();
    for path in files {
        let paragraphs = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|data| docx_paragraphs(&data));
        match paragraphs {
            Ok(paragraphs) => {
                let text = paragraphs
                    .into_iter()
                    .take(max_paragraphs)
                    .collect::<Vec<_>>()
                    .join("\n");
                chunks.push(text.trim().to_string());
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable reference report {}: {}", path.display(), e);
            }
        }
    }

    tracing::info!("Loaded {} reference style samples from {}", chunks.len(), dir.display());
    chunks.join("\n---\n")
}

/// `*.docx` files directly inside `dir`, sorted by path
pub fn reference_docx_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("docx"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_docx;

    #[test]
    fn test_samples_sorted_trimmed_and_corrupt_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.docx"), build_docx(&["  Beta uno", "Beta due", "Beta tre"])).unwrap();
        std::fs::write(dir.path().join("a.docx"), build_docx(&["Alfa"])).unwrap();
        std::fs::write(dir.path().join("c.docx"), b"corrupt").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let samples = load_style_samples(dir.path(), 2);
        assert_eq!(samples, "Alfa\n---\nBeta uno\nBeta due");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        assert_eq!(load_style_samples(Path::new("/nonexistent/reference"), 8), "");
    }

    #[tokio::test]
    async fn test_loader_falls_back_to_builtin_text() {
        let loader = StyleLoader::new("/nonexistent/reference", 8);
        let text = loader.reference_style_text().await;
        assert_eq!(text, PREDEFINED_STYLE_REFERENCE_TEXT);
    }
}
