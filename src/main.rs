//! kb-uploadr - Knowledge-base upload coordinator
//!
//! Uploads local files into a knowledge base through the signed-URL handshake
//! and prints the resulting tasks as JSON.

use anyhow::{bail, Context};
use clap::Parser;
use kb_uploadr::api::{ApiClient, HttpObjectStore};
use kb_uploadr::upload::memory::MemoryBackend;
use kb_uploadr::upload::{
    CoordinatorOptions, SimulatedRamp, UploadCoordinator, UploadFile, UploadStatus,
};
use kb_uploadr::{metrics, telemetry, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// kb-uploadr - Upload documents into a knowledge base
#[derive(Parser, Debug)]
#[command(name = "kb-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kb-uploadr.yaml")]
    config: PathBuf,

    /// Knowledge base to register documents under (overrides upload.knowledge_base_id)
    #[arg(short, long)]
    knowledge_base: Option<String>,

    /// Run the pipeline against an in-memory backend instead of the API
    #[arg(long)]
    dry_run: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long)]
    log_level: Option<String>,

    /// Files to upload, processed in the order given
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    telemetry::init_subscriber(&config.logging, args.log_level.as_deref())?;
    info!("Starting kb-uploadr v{}", kb_uploadr::VERSION);

    let knowledge_base_id = args
        .knowledge_base
        .clone()
        .or_else(|| config.upload.knowledge_base_id.clone())
        .context("No knowledge base given: pass --knowledge-base or set upload.knowledge_base_id")?;

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        files.push(file);
    }

    let builder = UploadCoordinator::builder()
        .options(CoordinatorOptions::from_config(&config, knowledge_base_id))
        .progress_estimator(Arc::new(SimulatedRamp::from_config(
            &config.upload.progress,
        )));

    let builder = if args.dry_run {
        info!("Dry run: using in-memory backend");
        builder.backend(Arc::new(MemoryBackend::new()))
    } else {
        let api = Arc::new(ApiClient::from_config(&config.api)?);
        let store = Arc::new(HttpObjectStore::new(config.storage.timeout())?);
        builder.issuer(api.clone()).registrar(api).object_store(store)
    };
    let coordinator = builder.build()?;

    let tasks = coordinator.submit(files).await;
    println!("{}", serde_json::to_string_pretty(&tasks)?);

    if args.print_metrics {
        eprintln!("{}", metrics::render());
    }

    let failed = tasks
        .iter()
        .filter(|task| task.status() != UploadStatus::Completed)
        .count();
    if failed > 0 {
        bail!("{} of {} uploads failed", failed, tasks.len());
    }

    Ok(())
}
