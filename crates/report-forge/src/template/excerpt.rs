//! Template excerpt used to prime the language model

use std::path::Path;

use crate::error::{Error, Result};
use crate::ingestion::parser::docx_paragraphs;

/// First `paragraphs` paragraph texts of the template, joined with newlines
pub async fn load_template_excerpt(template_path: &Path, paragraphs: usize, request_id: &str) -> Result<String> {
    let data = tokio::fs::read(template_path).await.map_err(|e| {
        tracing::error!(
            "[{}] Template file not found: {} ({})",
            request_id,
            template_path.display(),
            e
        );
        Error::Config(format!(
            "Template file not found or invalid: {}",
            template_path.display()
        ))
    })?;

    let excerpt = excerpt_from_bytes(&data, paragraphs).map_err(|e| {
        tracing::error!(
            "[{}] Template file corrupted: {} ({})",
            request_id,
            template_path.display(),
            e
        );
        Error::Config(format!(
            "Template file not found or invalid: {}",
            template_path.display()
        ))
    })?;

    tracing::debug!("[{}] Loaded template excerpt: {} chars", request_id, excerpt.len());
    Ok(excerpt)
}

fn excerpt_from_bytes(data: &[u8], paragraphs: usize) -> std::result::Result<String, String> {
    let all = docx_paragraphs(data)?;
    Ok(all.into_iter().take(paragraphs).collect::<Vec<_>>().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_docx;

    #[tokio::test]
    async fn test_excerpt_takes_first_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.docx");
        std::fs::write(&path, build_docx(&["Uno", "Due", "Tre"])).unwrap();

        assert_eq!(load_template_excerpt(&path, 2, "t").await.unwrap(), "Uno\nDue");
        assert_eq!(load_template_excerpt(&path, 8, "t").await.unwrap(), "Uno\nDue\nTre");
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_template_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.docx");
        assert!(matches!(
            load_template_excerpt(&missing, 8, "t").await,
            Err(Error::Config(_))
        ));

        let corrupt = dir.path().join("corrupt.docx");
        std::fs::write(&corrupt, b"garbage").unwrap();
        assert!(matches!(
            load_template_excerpt(&corrupt, 8, "t").await,
            Err(Error::Config(_))
        ));
    }
}
