//! Report data model

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::JsonMap;

/// Fields injected into the DOCX template
///
/// Every field is optional: the language model leaves unknown values out
/// (or sets them to `null`), and the clarification flow fills the gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportContext {
    pub client: Option<String>,
    pub client_address1: Option<String>,
    pub client_address2: Option<String>,
    pub date: Option<String>,
    pub vs_rif: Option<String>,
    pub rif_broker: Option<String>,
    pub polizza: Option<String>,
    pub ns_rif: Option<String>,
    pub assicurato: Option<String>,
    pub indirizzo_ass1: Option<String>,
    pub indirizzo_ass2: Option<String>,
    pub luogo: Option<String>,
    pub data_danno: Option<String>,
    pub cause: Option<String>,
    pub data_incarico: Option<String>,
    pub merce: Option<String>,
    pub peso_merce: Option<String>,
    pub valore_merce: Option<String>,
    pub data_intervento: Option<String>,
    pub dinamica_eventi: Option<String>,
    pub accertamenti: Option<String>,
    pub quantificazione: Option<String>,
    pub commento: Option<String>,
    /// Attachment list; a single string is accepted as a one-item list
    #[serde(default, deserialize_with = "deserialize_allegati")]
    pub allegati: Option<Vec<String>>,
}

impl ReportContext {
    /// Build a context from a loosely typed JSON object
    ///
    /// Unknown keys are ignored. Numbers and booleans are stringified,
    /// `null` leaves the field unset.
    pub fn from_json_map(map: &JsonMap) -> Self {
        let mut ctx = Self::default();
        for (key, value) in map {
            if key == "allegati" {
                ctx.allegati = allegati_from_value(value);
                continue;
            }
            if let Some(slot) = ctx.field_mut(key) {
                *slot = scalar_to_string(value);
            }
        }
        ctx
    }

    /// Get a field value by its JSON key
    ///
    /// `allegati` is returned joined with newlines.
    pub fn get(&self, key: &str) -> Option<String> {
        if key == "allegati" {
            return self.allegati.as_ref().map(|items| items.join("\n"));
        }
        self.field(key).and_then(|v| v.clone())
    }

    fn field(&self, key: &str) -> Option<&Option<String>> {
        let slot = match key {
            "client" => &self.client,
            "client_address1" => &self.client_address1,
            "client_address2" => &self.client_address2,
            "date" => &self.date,
            "vs_rif" => &self.vs_rif,
            "rif_broker" => &self.rif_broker,
            "polizza" => &self.polizza,
            "ns_rif" => &self.ns_rif,
            "assicurato" => &self.assicurato,
            "indirizzo_ass1" => &self.indirizzo_ass1,
            "indirizzo_ass2" => &self.indirizzo_ass2,
            "luogo" => &self.luogo,
            "data_danno" => &self.data_danno,
            "cause" => &self.cause,
            "data_incarico" => &self.data_incarico,
            "merce" => &self.merce,
            "peso_merce" => &self.peso_merce,
            "valore_merce" => &self.valore_merce,
            "data_intervento" => &self.data_intervento,
            "dinamica_eventi" => &self.dinamica_eventi,
            "accertamenti" => &self.accertamenti,
            "quantificazione" => &self.quantificazione,
            "commento" => &self.commento,
            _ => return None,
        };
        Some(slot)
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        let slot = match key {
            "client" => &mut self.client,
            "client_address1" => &mut self.client_address1,
            "client_address2" => &mut self.client_address2,
            "date" => &mut self.date,
            "vs_rif" => &mut self.vs_rif,
            "rif_broker" => &mut self.rif_broker,
            "polizza" => &mut self.polizza,
            "ns_rif" => &mut self.ns_rif,
            "assicurato" => &mut self.assicurato,
            "indirizzo_ass1" => &mut self.indirizzo_ass1,
            "indirizzo_ass2" => &mut self.indirizzo_ass2,
            "luogo" => &mut self.luogo,
            "data_danno" => &mut self.data_danno,
            "cause" => &mut self.cause,
            "data_incarico" => &mut self.data_incarico,
            "merce" => &mut self.merce,
            "peso_merce" => &mut self.peso_merce,
            "valore_merce" => &mut self.valore_merce,
            "data_intervento" => &mut self.data_intervento,
            "dinamica_eventi" => &mut self.dinamica_eventi,
            "accertamenti" => &mut self.accertamenti,
            "quantificazione" => &mut self.quantificazione,
            "commento" => &mut self.commento,
            _ => return None,
        };
        Some(slot)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn allegati_from_value(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().filter_map(scalar_to_string).collect()),
        other => scalar_to_string(other).map(|s| vec![s]),
    }
}

fn deserialize_allegati<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(allegati_from_value(&value))
}

/// One section of the generated outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineItem {
    /// Section key (e.g. `dinamica_eventi`)
    pub section: String,
    /// Human readable title
    pub title: String,
    /// Points the expanded section should cover
    pub bullets: Vec<String>,
}

/// Intermediate artifacts returned with a clarification request
/// and sent back by the client once the questions are answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestArtifacts {
    pub original_corpus: String,
    pub notes: String,
    pub template_excerpt: String,
    pub reference_style_text: String,
    /// Base fields from the first LLM call
    #[serde(default)]
    pub initial_llm_base_fields: JsonMap,
}

/// Body of `POST /api/generate-with-clarifications`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationPayload {
    /// Answers keyed by field; `null` or blank clears the field
    pub clarifications: HashMap<String, Option<String>>,
    pub request_artifacts: RequestArtifacts,
}

/// A critical field the model could not fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingField {
    pub key: String,
    pub label: String,
    pub question: String,
}
