//! Outline → expand → harmonize pipeline streaming its progress

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::{JsonMap, StreamEvent};

use super::expansion::expand_section;
use super::harmonize::harmonize;
use super::outline::generate_outline;

/// Texts the pipeline steps work from
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub template_excerpt: String,
    pub corpus: String,
    pub notes: String,
    pub reference_style_text: String,
    /// Pre-formatted similar cases block, may be empty
    pub similar_cases: String,
}

/// Runs the section pipeline on a background task
#[derive(Clone)]
pub struct PipelineService {
    llm: Arc<dyn LlmProvider>,
}

impl PipelineService {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Start the pipeline and return its event stream.
    ///
    /// The stream yields status events and ends with exactly one `data`
    /// event (the harmonized section map) or one `error` event.
    pub fn run(&self, request_id: String, inputs: PipelineInputs) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let service = self.clone();

        tokio::spawn(async move {
            tracing::info!(
                "[{}] Starting pipeline run with corpus length {}",
                request_id,
                inputs.corpus.len()
            );

            let last = match service.run_steps(&request_id, &inputs, &tx).await {
                Ok(sections) => {
                    tracing::info!("[{}] Pipeline completed successfully", request_id);
                    StreamEvent::data(None, sections)
                }
                Err(e) => {
                    tracing::error!("[{}] Pipeline run failed: {}", request_id, e);
                    StreamEvent::error(failure_message(&e))
                }
            };

            if tx.send(last).await.is_err() {
                tracing::debug!("[{}] Pipeline consumer went away", request_id);
            }
            tracing::info!("[{}] Pipeline processing finished", request_id);
        });

        ReceiverStream::new(rx)
    }

    async fn run_steps(
        &self,
        request_id: &str,
        inputs: &PipelineInputs,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<JsonMap> {
        let status = |message: String| async move {
            // a closed receiver only means nobody is listening any more
            let _ = tx.send(StreamEvent::status(message)).await;
        };

        status("Initializing report generation...".to_string()).await;

        if inputs.template_excerpt.is_empty() {
            return Err(Error::pipeline("Input validation failed: Template excerpt is missing."));
        }
        if inputs.corpus.is_empty() {
            return Err(Error::pipeline("Input validation failed: Corpus is missing."));
        }

        status("Generating report outline...".to_string()).await;
        let outline = generate_outline(
            self.llm.as_ref(),
            request_id,
            &inputs.template_excerpt,
            &inputs.corpus,
            &inputs.notes,
            &inputs.similar_cases,
        )
        .await?;
        status(format!("Outline generated with {} sections.", outline.len())).await;

        status("Expanding report sections...".to_string()).await;
        let mut sections = JsonMap::new();
        for (i, item) in outline.iter().enumerate() {
            status(format!(
                "Expanding section {}/{}: {}...",
                i + 1,
                outline.len(),
                item.title
            ))
            .await;
            let text = expand_section(
                self.llm.as_ref(),
                request_id,
                item,
                &inputs.corpus,
                &inputs.template_excerpt,
                &inputs.notes,
                &inputs.reference_style_text,
            )
            .await?;
            sections.insert(item.section.clone(), serde_json::Value::String(text));
            status(format!("Section '{}' expanded.", item.title)).await;
        }

        status("Harmonizing report content...".to_string()).await;
        let harmonized = harmonize(
            self.llm.as_ref(),
            request_id,
            &sections,
            &inputs.reference_style_text,
        )
        .await?;
        status("Content harmonization complete.".to_string()).await;

        Ok(harmonized)
    }
}

/// Error event text for a failed run, labeled by error category
fn failure_message(error: &Error) -> String {
    match error {
        Error::Llm(msg) => format!("LLM Service Error: {}", msg),
        Error::Http(err) => format!("LLM Service Error: {}", err),
        Error::Pipeline(msg) => format!("Pipeline Error: {}", msg),
        other => format!("An unexpected problem occurred in the pipeline: {}", other),
    }
}
