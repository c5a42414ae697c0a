//! Report server binary
//!
//! Run with: cargo run -p report-forge --bin report-forge-server

use report_forge::{config::ReportConfig, server::ReportServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "report_forge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                       Report Forge                        ║
║        Evidence extraction, LLM drafting, DOCX out        ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    let config = ReportConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM model: {}", config.llm.model_id);
    tracing::info!("  - LLM base URL: {}", config.llm.base_url);
    tracing::info!("  - Template: {}", config.template.template_path.display());
    tracing::info!("  - Vision: {}", config.llm.allow_vision);
    tracing::info!("  - Retrieval enabled: {}", config.retrieval.is_enabled());

    let address = config.server.address();
    let server = ReportServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", address);
    println!("  Health: http://{}/health", address);
    println!("\nEndpoints:");
    println!("  POST /api/generate                      - Stream a report draft (NDJSON)");
    println!("  POST /api/generate-with-clarifications  - Finish after clarifications (DOCX)");
    println!("  POST /api/finalize-report               - Render an edited context (DOCX)");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
