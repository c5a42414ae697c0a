//! Reference report indexer
//!
//! Run with: cargo run -p report-forge --bin index-reference-reports -- --help

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use report_forge::{
    config::ReportConfig,
    indexing::{ReferenceIndexer, ReferenceTable, REFERENCE_TABLE},
    providers::HuggingFaceEmbedder,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "index-reference-reports",
    about = "Embed the reference reports and store them in Supabase"
)]
struct Cli {
    /// Directory of reference DOCX reports (defaults to the configured one)
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Supabase service-role key, needed to write the table
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    service_key: String,

    /// Target table
    #[arg(long, default_value = REFERENCE_TABLE)]
    table: String,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "report_forge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ReportConfig::load()?;
    let retrieval = &config.retrieval;

    let url = retrieval
        .supabase_url
        .as_deref()
        .context("SUPABASE_URL is not set")?;
    let token = retrieval
        .hf_api_token
        .clone()
        .context("HF_API_TOKEN is not set")?;
    let dir = cli.dir.unwrap_or_else(|| config.template.reference_dir.clone());

    tracing::info!("Indexing reference reports from {}", dir.display());
    tracing::info!("  - Embedding model: {}", retrieval.embedding_model);
    tracing::info!("  - Table: {}", cli.table);

    let embedder = Arc::new(HuggingFaceEmbedder::new(retrieval, token)?);
    let table = ReferenceTable::new(retrieval, url, &cli.table, cli.service_key)?;
    let indexer = ReferenceIndexer::new(embedder, table);

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("template is compile-time constant")
                .progress_chars("█▓▒░  "),
        );
        pb
    };

    let summary = indexer.index_dir(&dir, &progress).await?;

    println!(
        "Indexed {} reports ({} too short, {} failed)",
        summary.indexed, summary.skipped, summary.failed
    );
    if summary.failed > 0 {
        anyhow::bail!("{} reports could not be indexed", summary.failed);
    }
    Ok(())
}
