//! NDJSON stream events emitted by the generation endpoint

use serde::{Deserialize, Serialize};

use super::report::{MissingField, RequestArtifacts};
use super::JsonMap;

/// Kind of stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Status,
    Data,
    ClarificationNeeded,
    Error,
    Finished,
}

/// One line of the `application/x-ndjson` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<MissingField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_artifacts: Option<RequestArtifacts>,
}

impl StreamEvent {
    fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            message: None,
            payload: None,
            missing_fields: None,
            request_artifacts: None,
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(EventType::Status)
        }
    }

    pub fn data(message: Option<String>, payload: JsonMap) -> Self {
        Self {
            message,
            payload: Some(payload),
            ..Self::new(EventType::Data)
        }
    }

    pub fn clarification_needed(missing: Vec<MissingField>, artifacts: RequestArtifacts) -> Self {
        Self {
            missing_fields: Some(missing),
            request_artifacts: Some(artifacts),
            ..Self::new(EventType::ClarificationNeeded)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(EventType::Error)
        }
    }

    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(EventType::Finished)
        }
    }

    /// Whether this event closes the stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            EventType::Finished | EventType::Error | EventType::ClarificationNeeded
        )
    }

    /// Serialize as a single NDJSON line (with trailing newline)
    pub fn to_ndjson_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                tracing::error!("Failed to serialize stream event: {}", e);
                "{\"type\":\"error\",\"message\":\"Failed to serialize event\"}\n".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_omits_empty_fields() {
        let line = StreamEvent::status("Loading template excerpt…").to_ndjson_line();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["message"], "Loading template excerpt…");
        assert!(value.get("payload").is_none());
        assert!(value.get("missing_fields").is_none());
    }

    #[test]
    fn test_clarification_needed_shape() {
        let event = StreamEvent::clarification_needed(
            vec![MissingField {
                key: "polizza".into(),
                label: "Numero Polizza".into(),
                question: "Qual è il numero di polizza?".into(),
            }],
            RequestArtifacts::default(),
        );
        assert!(event.is_terminal());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "clarification_needed");
        assert_eq!(value["missing_fields"][0]["key"], "polizza");
        assert!(value["request_artifacts"].is_object());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(!StreamEvent::status("x").is_terminal());
        assert!(!StreamEvent::data(None, JsonMap::new()).is_terminal());
        assert!(StreamEvent::error("x").is_terminal());
        assert!(StreamEvent::finished("x").is_terminal());
    }
}
