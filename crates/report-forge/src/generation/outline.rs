//! Outline step: list of sections with titles and bullets

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::OutlineItem;

use super::prompt::PromptBuilder;
use super::step::{execute_llm_step, ExpectedShape};

/// Generate and validate the section outline
pub async fn generate_outline(
    llm: &dyn LlmProvider,
    request_id: &str,
    template_excerpt: &str,
    corpus: &str,
    notes: &str,
    similar_cases: &str,
) -> Result<Vec<OutlineItem>> {
    tracing::info!("[{}] Generating outline", request_id);

    if template_excerpt.is_empty() {
        tracing::warn!("[{}] Outline generation called with empty template excerpt", request_id);
        return Err(Error::pipeline("Outline generation requires a template excerpt."));
    }
    if corpus.is_empty() {
        tracing::warn!("[{}] Outline generation called with empty corpus", request_id);
        return Err(Error::pipeline("Outline generation requires a corpus."));
    }

    let prompt = PromptBuilder::build_outline_prompt(template_excerpt, corpus, notes, similar_cases);
    let value = execute_llm_step(llm, request_id, "generate_outline", &prompt, ExpectedShape::Array)
        .await
        .map_err(|e| Error::pipeline(format!("Outline generation failed: {}", e)))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        _ => Vec::new(),
    };
    if items.is_empty() {
        tracing::error!("[{}] Empty outline list returned from LLM", request_id);
        return Err(Error::pipeline("Outline generation failed: Empty outline generated"));
    }

    let outline = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value::<OutlineItem>(item).map_err(|e| {
                tracing::error!("[{}] Validation failed for outline item #{}: {}", request_id, idx, e);
                Error::pipeline(format!(
                    "Outline generation failed: Invalid structure for outline item #{}: {}",
                    idx, e
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        "[{}] Successfully generated outline with {} sections",
        request_id,
        outline.len()
    );
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;

    #[tokio::test]
    async fn test_valid_outline() {
        let llm = ScriptedLlm::new([r#"[{"section": "commento", "title": "Commento", "bullets": ["a"]}]"#]);
        let outline = generate_outline(&llm, "t", "exc", "corpus", "", "").await.unwrap();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].section, "commento");
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected_without_llm_call() {
        let llm = ScriptedLlm::new(Vec::<&str>::new());
        assert!(matches!(
            generate_outline(&llm, "t", "", "corpus", "", "").await,
            Err(Error::Pipeline(_))
        ));
        assert!(matches!(
            generate_outline(&llm, "t", "exc", "", "", "").await,
            Err(Error::Pipeline(_))
        ));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_outline() {
        let llm = ScriptedLlm::new(["[]"]);
        let err = generate_outline(&llm, "t", "exc", "corpus", "", "").await.unwrap_err();
        assert!(err.to_string().contains("Empty outline generated"));
    }

    #[tokio::test]
    async fn test_invalid_item_reports_index() {
        let llm = ScriptedLlm::new([
            r#"[{"section": "a", "title": "A", "bullets": []}, {"section": "b"}]"#,
        ]);
        let err = generate_outline(&llm, "t", "exc", "corpus", "", "").await.unwrap_err();
        assert!(err.to_string().contains("Invalid structure for outline item #1"));
    }
}
