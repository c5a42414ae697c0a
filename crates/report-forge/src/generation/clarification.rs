//! Missing-field detection and merging of user answers

use serde_json::Value;
use std::collections::HashMap;

use crate::config::CriticalField;
use crate::types::{JsonMap, MissingField};

/// Critical fields whose value is absent or null, in configuration order
pub fn identify_missing_fields(base_ctx: &JsonMap, critical_fields: &[CriticalField]) -> Vec<MissingField> {
    critical_fields
        .iter()
        .filter(|field| base_ctx.get(&field.key).map(Value::is_null).unwrap_or(true))
        .map(|field| MissingField {
            key: field.key.clone(),
            label: field.label.clone(),
            question: field.question.clone(),
        })
        .collect()
}

/// Apply clarifications: non-blank answers override, blank answers clear existing keys
pub fn merge_clarifications(base_ctx: &mut JsonMap, clarifications: &HashMap<String, Option<String>>) {
    for (key, value) in clarifications {
        match value {
            Some(answer) if !answer.trim().is_empty() => {
                base_ctx.insert(key.clone(), Value::String(answer.clone()));
                tracing::debug!("Clarification applied for '{}'", key);
            }
            _ if base_ctx.contains_key(key) => {
                base_ctx.insert(key.clone(), Value::String(String::new()));
            }
            _ => {}
        }
    }
}
