//! Base context: the first LLM call filling every template field

use serde_json::Value;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::JsonMap;

use super::json::extract_json;
use super::prompt::{BasePromptInput, PromptBuilder};

/// Build the base prompt, enforce the size budget and parse the reply into a field map
pub async fn extract_base_context(
    llm: &dyn LlmProvider,
    request_id: &str,
    input: &BasePromptInput<'_>,
    max_total_prompt_chars: usize,
) -> Result<JsonMap> {
    let prompt = PromptBuilder::build_base_prompt(input);
    let prompt_chars = prompt.chars().count();
    if prompt_chars > max_total_prompt_chars {
        tracing::warn!("[{}] Prompt too large: {} chars", request_id, prompt_chars);
        return Err(Error::PromptTooLarge(prompt_chars));
    }

    let raw = llm.complete(&prompt).await.map_err(|e| {
        tracing::error!("[{}] LLM call for base context failed: {}", request_id, e);
        e
    })?;

    match extract_json(&raw)? {
        Value::Object(map) => {
            tracing::info!("[{}] Extracted {} base context fields", request_id, map.len());
            Ok(map)
        }
        other => {
            tracing::error!("[{}] Base context is not a JSON object", request_id);
            Err(Error::JsonParsing(format!(
                "Base context must be a JSON object, got: {}",
                other
            )))
        }
    }
}
