//! Harmonization step: one tone across all sections

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::JsonMap;

use super::prompt::PromptBuilder;
use super::step::{execute_llm_step, ExpectedShape};

/// Rewrite `sections` consistently; the result must keep every input key
pub async fn harmonize(
    llm: &dyn LlmProvider,
    request_id: &str,
    sections: &JsonMap,
    reference_style_text: &str,
) -> Result<JsonMap> {
    tracing::info!("[{}] Harmonizing {} sections", request_id, sections.len());
    let fail = |e: Error| Error::pipeline(format!("Failed to harmonize sections: {}", e));

    let sections_json = serde_json::to_string_pretty(sections).map_err(|e| fail(e.into()))?;
    let prompt = PromptBuilder::build_harmonize_prompt(&sections_json, reference_style_text);

    let value = execute_llm_step(llm, request_id, "harmonize", &prompt, ExpectedShape::Object)
        .await
        .map_err(fail)?;
    let harmonized = match value {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    };

    let mut missing: Vec<&str> = sections
        .keys()
        .filter(|k| !harmonized.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        tracing::error!(
            "[{}] Incomplete harmonization result, missing: {:?}",
            request_id,
            missing
        );
        return Err(fail(Error::pipeline(format!(
            "Harmonization result missed expected sections: {}",
            missing.join(", ")
        ))));
    }

    tracing::info!("[{}] Harmonized sections: {:?}", request_id, harmonized.keys().collect::<Vec<_>>());
    Ok(harmonized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use serde_json::json;

    fn sections() -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("commento".into(), json!("a"));
        map.insert("accertamenti".into(), json!("b"));
        map
    }

    #[tokio::test]
    async fn test_keeps_all_keys() {
        let llm = ScriptedLlm::new([r#"{"commento": "A", "accertamenti": "B", "extra": "C"}"#]);
        let out = harmonize(&llm, "t", &sections(), "").await.unwrap();
        assert_eq!(out["commento"], "A");
        assert!(llm.prompts()[0].contains("\"accertamenti\": \"b\""));
    }

    #[tokio::test]
    async fn test_missing_keys_listed() {
        let llm = ScriptedLlm::new([r#"{"commento": "A"}"#]);
        let err = harmonize(&llm, "t", &sections(), "").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(_)));
        assert!(err.to_string().contains("missed expected sections: accertamenti"));
    }
}
