//! Shmulik ingest tool
//!
//! Builds or updates the vector index from PDF documents:
//! 1. Discovers PDFs in the given files/directories (or the configured paths)
//! 2. Extracts, cleans and chunks each document
//! 3. Embeds the chunks and writes them to the index
//! 4. Prints a JSON report

use anyhow::Context;
use clap::Parser;
use shmulik_common::config::AppConfig;
use shmulik_common::embeddings::create_embedder;
use shmulik_common::observability::init_tracing;
use shmulik_common::VERSION;
use shmulik_ingestion::{build_index, discover_pdfs, DocumentProcessor};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Build the Shmulik vector index from PDF documents")]
struct Args {
    /// Configuration file (defaults to config/ and APP__ environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rebuild the index from scratch instead of updating it
    #[arg(long)]
    recreate: bool,

    /// Extract and chunk only; nothing is embedded or written
    #[arg(long)]
    dry_run: bool,

    /// PDF files or directories (defaults to documents.paths)
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting Shmulik ingest v{}", VERSION);

    let paths = if args.paths.is_empty() {
        config.documents.paths.clone()
    } else {
        args.paths.clone()
    };

    if args.dry_run {
        return dry_run(&config, &paths).await;
    }

    let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        index = %config.index.path.display(),
        recreate = args.recreate,
        "Ingesting documents"
    );

    let (_, report) = build_index(&config, embedder, &paths, args.recreate)
        .await
        .map_err(|e| {
            error!(error = %e, "Ingestion failed");
            e
        })?;

    for failure in &report.failures {
        warn!(path = %failure.path, error = %failure.error, "Document not ingested");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn dry_run(config: &AppConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let processor = DocumentProcessor::from_config(config)?;
    let pdfs = discover_pdfs(paths)?;
    info!(documents = pdfs.len(), "Dry run");

    let mut summaries = Vec::with_capacity(pdfs.len());
    for pdf in &pdfs {
        match processor.process(pdf).await {
            Ok(processed) => {
                let warnings = processed.stats.warnings(config.chunking.chunk_size);
                summaries.push(serde_json::json!({
                    "document": processed.document.id,
                    "sourceFile": processed.document.source_file,
                    "stats": processed.stats,
                    "warnings": warnings,
                }));
            }
            Err(e) => summaries.push(serde_json::json!({
                "path": pdf.display().to_string(),
                "error": e.to_string(),
            })),
        }
    }

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
