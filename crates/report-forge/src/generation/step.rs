//! Single LLM call with JSON shape checking

use serde_json::Value;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;

use super::json::extract_json;

/// Top-level JSON shape a step expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Object,
    Array,
}

impl ExpectedShape {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ExpectedShape::Object => value.is_object(),
            ExpectedShape::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ExpectedShape::Object => "object",
            ExpectedShape::Array => "array",
        }
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Call the model with `prompt`, parse the reply and check its shape
pub async fn execute_llm_step(
    llm: &dyn LlmProvider,
    request_id: &str,
    step_name: &str,
    prompt: &str,
    expected: ExpectedShape,
) -> Result<Value> {
    tracing::debug!("[{}] Running step '{}' ({} chars)", request_id, step_name, prompt.len());

    let raw = llm.complete(prompt).await?;
    let value = extract_json(&raw)?;

    if !expected.matches(&value) {
        tracing::error!(
            "[{}] Step '{}' returned a JSON {}, expected {}",
            request_id,
            step_name,
            shape_of(&value),
            expected.name()
        );
        return Err(Error::JsonParsing(format!(
            "Step '{}' expected a JSON {} but got {}",
            step_name,
            expected.name(),
            shape_of(&value)
        )));
    }

    Ok(value)
}
