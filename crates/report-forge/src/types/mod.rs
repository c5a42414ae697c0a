//! Core types for report generation

pub mod event;
pub mod report;

pub use event::{EventType, StreamEvent};
pub use report::{ClarificationPayload, MissingField, OutlineItem, ReportContext, RequestArtifacts};

/// Free-form JSON object exchanged with the language model
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
