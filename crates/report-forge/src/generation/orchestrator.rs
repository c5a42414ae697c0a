//! End-to-end report generation: extraction, context, clarification, pipeline

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::{CriticalField, ReportConfig};
use crate::error::{Error, Result};
use crate::ingestion::{Extractor, OcrEngine, UploadedFile};
use crate::providers::{LlmProvider, SimilarCaseRetriever};
use crate::template::{self, load_template_excerpt, StyleLoader};
use crate::types::{ClarificationPayload, EventType, ReportContext, RequestArtifacts, StreamEvent};

use super::clarification::{identify_missing_fields, merge_clarifications};
use super::context::extract_base_context;
use super::pipeline::{PipelineInputs, PipelineService};
use super::prompt::{BasePromptInput, PromptBuilder};

const UNEXPECTED_TERMINATION: &str =
    "The report generation process terminated unexpectedly on the server. Please try again.";

/// Sends events to the client, letting through at most one terminal event
#[derive(Clone)]
struct EventEmitter {
    tx: mpsc::Sender<StreamEvent>,
    closed: Arc<AtomicBool>,
}

impl EventEmitter {
    fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn emit(&self, event: StreamEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if event.is_terminal() {
            self.closed.store(true, Ordering::SeqCst);
        }
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Client disconnected, dropping event");
        }
    }

    async fn status(&self, message: impl Into<String>) {
        self.emit(StreamEvent::status(message)).await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Report generation service shared by the HTTP handlers
pub struct ReportGenerator {
    llm: Arc<dyn LlmProvider>,
    retriever: Arc<dyn SimilarCaseRetriever>,
    extractor: Extractor,
    styles: StyleLoader,
    pipeline: PipelineService,
    template_path: PathBuf,
    excerpt_paragraphs: usize,
    top_k: usize,
    max_total_prompt_chars: usize,
    allow_vision: bool,
    critical_fields: Vec<CriticalField>,
}

impl ReportGenerator {
    pub fn new(
        config: &ReportConfig,
        llm: Arc<dyn LlmProvider>,
        retriever: Arc<dyn SimilarCaseRetriever>,
    ) -> Self {
        Self {
            pipeline: PipelineService::new(Arc::clone(&llm)),
            llm,
            retriever,
            extractor: Extractor::new(config.extraction.clone()).with_ocr(
                OcrEngine::new(config.extraction.ocr_language.clone())
                    .with_binary(config.extraction.ocr_binary.clone())
                    .with_scratch_dir(config.cleanup.scratch_dir.clone()),
            ),
            styles: StyleLoader::new(
                config.template.reference_dir.clone(),
                config.template.max_style_paragraphs,
            ),
            template_path: config.template.template_path.clone(),
            excerpt_paragraphs: config.template.excerpt_paragraphs,
            top_k: config.retrieval.top_k,
            max_total_prompt_chars: config.extraction.max_total_prompt_chars,
            allow_vision: config.llm.allow_vision,
            critical_fields: config.clarification.critical_fields.clone(),
        }
    }

    /// Run the whole generation flow, streaming progress as NDJSON events.
    ///
    /// The stream always ends with exactly one `finished`, `error` or
    /// `clarification_needed` event.
    pub fn stream_report_generation(
        self: &Arc<Self>,
        files: Vec<UploadedFile>,
        notes: String,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let emitter = EventEmitter::new(tx);
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(
            "[{}] Initiating streaming report generation: {} files",
            request_id,
            files.len()
        );

        let this = Arc::clone(self);
        let producer_emitter = emitter.clone();
        let producer_id = request_id.clone();
        let producer = tokio::spawn(async move {
            if let Err(e) = this.generate(&producer_id, files, notes, &producer_emitter).await {
                tracing::error!("[{}] {} during stream: {}", producer_id, e.kind(), e);
                producer_emitter.emit(StreamEvent::error(e.stream_message())).await;
            }
        });

        tokio::spawn(async move {
            if let Err(e) = producer.await {
                tracing::error!("[{}] Generation task aborted: {}", request_id, e);
            }
            if !emitter.is_closed() {
                tracing::warn!(
                    "[{}] Stream exiting without a proper final event. Yielding generic error.",
                    request_id
                );
                emitter.emit(StreamEvent::error(UNEXPECTED_TERMINATION)).await;
            }
            tracing::info!("[{}] Stream generation logic finished.", request_id);
        });

        ReceiverStream::new(rx)
    }

    async fn generate(
        &self,
        request_id: &str,
        files: Vec<UploadedFile>,
        notes: String,
        events: &EventEmitter,
    ) -> Result<()> {
        let reference_style_text = self.styles.reference_style_text().await;
        events.status("Stylistic references loaded.").await;

        events.status("Validating inputs and extracting content…").await;
        let corpus = self.extractor.extract_corpus(&files, request_id).await?;
        events
            .status(format!("Content extracted: {} chars.", corpus.chars().count()))
            .await;

        events.status("Loading template excerpt…").await;
        let template_excerpt =
            load_template_excerpt(&self.template_path, self.excerpt_paragraphs, request_id).await?;
        events.status("Template excerpt loaded.").await;

        let similar_cases = if corpus.trim().is_empty() {
            Vec::new()
        } else {
            match self.retriever.retrieve(&corpus, self.top_k).await {
                Ok(cases) => cases,
                Err(e) => {
                    tracing::warn!("[{}] Similar case retrieval failed, continuing without: {}", request_id, e);
                    Vec::new()
                }
            }
        };

        let image_tokens = if self.allow_vision {
            self.extractor.image_tokens(&files)
        } else {
            Vec::new()
        };

        events.status("Extracting base document context (LLM)…").await;
        let mut base_ctx = extract_base_context(
            self.llm.as_ref(),
            request_id,
            &BasePromptInput {
                template_excerpt: &template_excerpt,
                corpus: &corpus,
                notes: &notes,
                reference_style_text: &reference_style_text,
                similar_cases: &similar_cases,
                image_tokens: &image_tokens,
                allow_vision: self.allow_vision,
            },
            self.max_total_prompt_chars,
        )
        .await?;
        events.status("Base document context extracted.").await;

        let missing = identify_missing_fields(&base_ctx, &self.critical_fields);
        if !missing.is_empty() {
            tracing::info!("[{}] Clarification needed for {} fields.", request_id, missing.len());
            let artifacts = RequestArtifacts {
                original_corpus: corpus,
                notes,
                template_excerpt,
                reference_style_text,
                initial_llm_base_fields: base_ctx,
            };
            events
                .emit(StreamEvent::clarification_needed(missing, artifacts))
                .await;
            return Ok(());
        }

        events
            .status("No immediate clarifications needed. Starting main report generation pipeline…")
            .await;

        let inputs = PipelineInputs {
            template_excerpt,
            corpus,
            notes,
            reference_style_text,
            similar_cases: PromptBuilder::format_similar_cases(&similar_cases),
        };
        let mut updates = self.pipeline.run(request_id.to_string(), inputs);
        let mut sections = None;

        while let Some(update) = updates.next().await {
            match update.event_type {
                EventType::Data => {
                    sections = update.payload;
                    events
                        .status("Core content generation complete. Finalising report data…")
                        .await;
                }
                EventType::Error => {
                    let message = update
                        .message
                        .unwrap_or_else(|| "Unknown pipeline error".to_string());
                    tracing::error!("[{}] Error from pipeline stream: {}", request_id, message);
                    events.emit(StreamEvent::error(message)).await;
                    return Ok(());
                }
                _ => events.emit(update).await,
            }
        }

        let sections = sections.ok_or_else(|| {
            tracing::error!("[{}] Pipeline completed without providing final section map.", request_id);
            Error::pipeline("Pipeline did not return section map data.")
        })?;

        base_ctx.extend(sections);
        events
            .emit(StreamEvent::data(
                Some("Report data processing complete. Document download will be initiated by client.".to_string()),
                base_ctx,
            ))
            .await;
        events.emit(StreamEvent::finished("Stream completed successfully.")).await;
        Ok(())
    }

    /// Apply the user's answers, rerun the pipeline on the stored artifacts
    /// and return the final context.
    pub async fn build_report_with_clarifications(
        &self,
        payload: ClarificationPayload,
        request_id: &str,
    ) -> Result<ReportContext> {
        tracing::info!("[{}] Building report with clarifications", request_id);
        let ClarificationPayload {
            clarifications,
            request_artifacts: artifacts,
        } = payload;

        let mut base_ctx = artifacts.initial_llm_base_fields;
        merge_clarifications(&mut base_ctx, &clarifications);

        let inputs = PipelineInputs {
            template_excerpt: artifacts.template_excerpt,
            corpus: artifacts.original_corpus,
            notes: artifacts.notes,
            reference_style_text: artifacts.reference_style_text,
            similar_cases: String::new(),
        };
        let mut updates = self.pipeline.run(request_id.to_string(), inputs);
        let mut sections = None;

        while let Some(update) = updates.next().await {
            match update.event_type {
                EventType::Data => {
                    sections = update.payload;
                    break;
                }
                EventType::Error => {
                    let message = update
                        .message
                        .unwrap_or_else(|| "Unknown pipeline error in clarification flow".to_string());
                    tracing::error!("[{}] Pipeline error in clarification flow: {}", request_id, message);
                    return Err(Error::Pipeline(message));
                }
                _ => {}
            }
        }

        let sections = sections.ok_or_else(|| {
            Error::pipeline("Pipeline did not return the expected section map during clarification flow.")
        })?;

        base_ctx.extend(sections);
        tracing::info!("[{}] Final context ready after clarification", request_id);
        Ok(ReportContext::from_json_map(&base_ctx))
    }

    /// Inject a context into the DOCX template
    pub async fn render_docx(&self, ctx: &ReportContext, request_id: &str) -> Result<Vec<u8>> {
        let bytes = template::inject(&self.template_path, ctx, request_id).await?;
        tracing::info!("[{}] Successfully generated DOCX report", request_id);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateConfig;
    use crate::providers::{NoopRetriever, SimilarCase};
    use crate::test_support::{build_docx, ScriptedLlm};
    use async_trait::async_trait;
    use serde_json::json;

    const FULL_BASE: &str = r#"{"client": "ACME", "polizza": "P1", "data_danno": "01/01/2024",
        "assicurato": "Beta", "luogo": "Genova", "cause": "Urto"}"#;
    const OUTLINE: &str = r#"[{"section": "commento", "title": "Commento", "bullets": ["x"]}]"#;
    const EXPANDED: &str = r#"{"commento": "Testo"}"#;
    const HARMONIZED: &str = r#"{"commento": "Testo armonizzato"}"#;

    struct PanickingLlm;

    #[async_trait]
    impl LlmProvider for PanickingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            panic!("model backend crashed");
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "panicking"
        }

        fn model(&self) -> &str {
            "panicking"
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl SimilarCaseRetriever for FailingRetriever {
        async fn retrieve(&self, _text: &str, _k: usize) -> Result<Vec<SimilarCase>> {
            Err(Error::Config("vector store unreachable".into()))
        }
    }

    fn generator(dir: &tempfile::TempDir, llm: Arc<ScriptedLlm>) -> Arc<ReportGenerator> {
        generator_with(dir, llm, Arc::new(NoopRetriever))
    }

    fn generator_with(
        dir: &tempfile::TempDir,
        llm: Arc<dyn LlmProvider>,
        retriever: Arc<dyn SimilarCaseRetriever>,
    ) -> Arc<ReportGenerator> {
        let template_path = dir.path().join("template.docx");
        std::fs::write(&template_path, build_docx(&["Spett.le {{CLIENT}}", "{{COMMENTO}}"])).unwrap();
        let config = ReportConfig {
            template: TemplateConfig {
                template_path,
                reference_dir: dir.path().join("reference"),
                ..TemplateConfig::default()
            },
            ..ReportConfig::default()
        };
        Arc::new(ReportGenerator::new(&config, llm, retriever))
    }

    fn files() -> Vec<UploadedFile> {
        vec![UploadedFile::new("doc.docx", build_docx(&["Nolo e fattura"]))]
    }

    async fn collect(stream: ReceiverStream<StreamEvent>) -> Vec<StreamEvent> {
        stream.collect().await
    }

    fn terminal_count(events: &[StreamEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn test_full_flow_ends_with_data_then_finished() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([FULL_BASE, OUTLINE, EXPANDED, HARMONIZED]));
        let events = collect(generator(&dir, llm).stream_report_generation(files(), "nota".into())).await;

        let n = events.len();
        assert_eq!(events[n - 1].event_type, EventType::Finished);
        assert_eq!(events[n - 2].event_type, EventType::Data);
        let payload = events[n - 2].payload.as_ref().unwrap();
        assert_eq!(payload["client"], "ACME");
        assert_eq!(payload["commento"], "Testo armonizzato");
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_retrieval_failure_does_not_stop_generation() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([FULL_BASE, OUTLINE, EXPANDED, HARMONIZED]));
        let events = collect(
            generator_with(&dir, llm, Arc::new(FailingRetriever))
                .stream_report_generation(files(), "nota".into()),
        )
        .await;

        let n = events.len();
        assert_eq!(events[n - 1].event_type, EventType::Finished);
        assert_eq!(events[n - 2].event_type, EventType::Data);
        assert_eq!(events[n - 2].payload.as_ref().unwrap()["commento"], "Testo armonizzato");
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_panic_in_generation_yields_termination_error() {
        let dir = tempfile::tempdir().unwrap();
        let events = collect(
            generator_with(&dir, Arc::new(PanickingLlm), Arc::new(NoopRetriever))
                .stream_report_generation(files(), String::new()),
        )
        .await;

        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::Error);
        assert_eq!(last.message.as_deref(), Some(UNEXPECTED_TERMINATION));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_ask_for_clarification() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([r#"{"client": "ACME", "polizza": null}"#]));
        let events = collect(generator(&dir, llm.clone()).stream_report_generation(files(), "nota".into())).await;

        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::ClarificationNeeded);
        let missing = last.missing_fields.as_ref().unwrap();
        assert_eq!(missing[0].key, "polizza");
        let artifacts = last.request_artifacts.as_ref().unwrap();
        assert_eq!(artifacts.original_corpus, "Nolo e fattura");
        assert_eq!(artifacts.notes, "nota");
        assert_eq!(terminal_count(&events), 1);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_is_one_prefixed_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(Vec::<&str>::new()));
        let events = collect(generator(&dir, llm).stream_report_generation(files(), String::new())).await;

        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::Error);
        assert!(last
            .message
            .as_deref()
            .unwrap()
            .starts_with("Language model processing error:"));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(Vec::<&str>::new()));
        let bad = vec![UploadedFile::new("virus.exe", b"MZ".to_vec())];
        let events = collect(generator(&dir, llm).stream_report_generation(bad, String::new())).await;

        assert_eq!(events.len(), 3);
        let last = events.last().unwrap();
        assert!(last.message.as_deref().unwrap().starts_with("Input validation error:"));
    }

    #[tokio::test]
    async fn test_pipeline_error_forwarded_once() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([FULL_BASE, "[]"]));
        let events = collect(generator(&dir, llm).stream_report_generation(files(), String::new())).await;

        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::Error);
        assert!(last.message.as_deref().unwrap().starts_with("Pipeline Error:"));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_clarification_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([OUTLINE, EXPANDED, HARMONIZED]));
        let generator = generator(&dir, llm);

        let payload: ClarificationPayload = serde_json::from_value(json!({
            "clarifications": {"polizza": "POL-9", "luogo": null},
            "request_artifacts": {
                "original_corpus": "corpus",
                "notes": "",
                "template_excerpt": "exc",
                "reference_style_text": "",
                "initial_llm_base_fields": {"client": "ACME", "polizza": null, "luogo": "Genova"},
                "image_tokens": ["ignored"]
            }
        }))
        .unwrap();

        let ctx = generator.build_report_with_clarifications(payload, "t").await.unwrap();
        assert_eq!(ctx.polizza.as_deref(), Some("POL-9"));
        assert_eq!(ctx.luogo.as_deref(), Some(""));
        assert_eq!(ctx.commento.as_deref(), Some("Testo armonizzato"));

        let docx = generator.render_docx(&ctx, "t").await.unwrap();
        assert!(docx.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_clarification_pipeline_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(["[]"]));
        let payload = ClarificationPayload {
            clarifications: Default::default(),
            request_artifacts: RequestArtifacts {
                original_corpus: "corpus".into(),
                template_excerpt: "exc".into(),
                ..RequestArtifacts::default()
            },
        };

        let err = generator(&dir, llm)
            .build_report_with_clarifications(payload, "t")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline(ref m) if m.starts_with("Pipeline Error:")));
    }
}
