//! Section expansion step

use serde_json::Value;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::OutlineItem;

use super::prompt::PromptBuilder;
use super::step::{execute_llm_step, ExpectedShape};

/// Guiding question for a section key, empty for unknown sections
pub fn section_question(section: &str) -> &'static str {
    match section {
        "dinamica_eventi" => "Chi, cosa, quando, dove e perché è avvenuto il sinistro?",
        "accertamenti" => "Quali prove fotografiche e rilievi del danno sono stati eseguiti? Chi, dove e quando?",
        "quantificazione" => "Dettaglia costi totali del danno come lista puntata o tabella testo.",
        "commento" => "Fornisci una sintesi tecnica finale e le raccomandazioni.",
        _ => "",
    }
}

/// Expand one outline item into section text
pub async fn expand_section(
    llm: &dyn LlmProvider,
    request_id: &str,
    item: &OutlineItem,
    corpus: &str,
    template_excerpt: &str,
    notes: &str,
    reference_style_text: &str,
) -> Result<String> {
    tracing::info!(
        "[{}] Expanding section '{}' with {} bullets",
        request_id,
        item.title,
        item.bullets.len()
    );

    let prompt = PromptBuilder::build_expand_section_prompt(
        &item.title,
        &item.section,
        &item.bullets,
        section_question(&item.section),
        corpus,
        template_excerpt,
        notes,
        reference_style_text,
    );

    let step_name = format!("expand_section ('{}')", item.title);
    let fail = |e: Error| Error::pipeline(format!("Failed to expand section {}: {}", item.title, e));

    let out = execute_llm_step(llm, request_id, &step_name, &prompt, ExpectedShape::Object)
        .await
        .map_err(fail)?;

    let content = match out.get(&item.section) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if content.trim().is_empty() {
        tracing::error!("[{}] Empty content returned for section '{}'", request_id, item.title);
        return Err(fail(Error::pipeline(format!("Empty content for section {}", item.title))));
    }

    tracing::info!(
        "[{}] Expanded section '{}' to {} chars",
        request_id,
        item.title,
        content.len()
    );
    Ok(content)
}
