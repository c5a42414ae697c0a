//! report-forge: backend for drafting insurance-loss reports
//!
//! Uploaded evidence (PDF, DOCX, spreadsheets, images) is turned into a text
//! corpus, an OpenAI-compatible model drafts the report in several JSON steps
//! (base fields, outline, section expansion, harmonization) and the result is
//! injected into a DOCX template. Progress is streamed to the client as NDJSON.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod generation;
pub mod indexing;
pub mod ingestion;
pub mod providers;
pub mod server;
pub mod template;
pub mod types;

pub use config::ReportConfig;
pub use error::{Error, Result};
pub use generation::ReportGenerator;
pub use server::ReportServer;
pub use types::{
    event::{EventType, StreamEvent},
    report::{ClarificationPayload, ReportContext},
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::{Error, Result};
    use crate::providers::LlmProvider;

    /// Minimal DOCX with one paragraph per entry
    pub fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
        let mut doc = docx_rs::Docx::new();
        for text in paragraphs {
            doc = doc.add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*text)),
            );
        }
        let mut buf = Cursor::new(Vec::new());
        doc.build().pack(&mut buf).unwrap();
        buf.into_inner()
    }

    /// LLM that replays canned responses in order and records prompts
    pub struct ScriptedLlm {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().len()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| Error::llm("no scripted response left"))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }
}
