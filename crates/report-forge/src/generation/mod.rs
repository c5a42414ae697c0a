//! Multi-step LLM report generation
//!
//! A base-context call fills the template fields, then the section
//! pipeline (outline → expand → harmonize) writes the long-form sections.

pub mod clarification;
pub mod context;
pub mod expansion;
pub mod harmonize;
pub mod json;
pub mod orchestrator;
pub mod outline;
pub mod pipeline;
pub mod prompt;
pub mod step;

pub use clarification::{identify_missing_fields, merge_clarifications};
pub use json::extract_json;
pub use orchestrator::ReportGenerator;
pub use pipeline::{PipelineInputs, PipelineService};
pub use prompt::{BasePromptInput, PromptBuilder};
pub use step::{execute_llm_step, ExpectedShape};
