//! Ingestion CLI.
//!
//! Builds or resumes a corpus run from local JSONL corpus files. Exit
//! codes: 0 on success, 1 on failure, 130 when interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use lexrag::Settings;
use lexrag::embed::HashedEmbedder;
use lexrag::stores::MemoryVectorStore;

use lexrag_ingest::{
    CheckpointStore, IngestionPipeline, IngestionState, JsonlCrawler, PipelineConfig, RunStatus,
    UpdateTracker,
};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "lexrag-ingest",
    about = "Resumable bulk ingestion into the lexrag vector index"
)]
struct Cli {
    /// Corpus files (JSONL, one normalized record per line).
    #[arg(long = "corpus", required = true)]
    corpus: Vec<PathBuf>,

    /// Root directory for run checkpoints.
    #[arg(long, default_value = "data/checkpoints")]
    checkpoint_dir: PathBuf,

    /// Resume an existing run instead of starting a new one.
    #[arg(long)]
    resume: Option<String>,

    /// Incremental mode: only ingest records newer than the last
    /// successful update run.
    #[arg(long)]
    update: bool,

    /// Drop and recreate the vector collection before ingesting.
    #[arg(long)]
    recreate: bool,

    /// Documents per chunking batch.
    #[arg(long)]
    chunk_batch_size: Option<usize>,

    /// Chunks per embed+upsert batch.
    #[arg(long)]
    embedding_batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(size) = cli.chunk_batch_size {
        settings.chunk_batch_size = size;
    }
    if let Some(size) = cli.embedding_batch_size {
        settings.embedding_batch_size = size;
    }

    let checkpoints = CheckpointStore::new(&cli.checkpoint_dir);
    let crawlers = cli
        .corpus
        .iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "corpus".to_string());
            Arc::new(JsonlCrawler::new(name, path)) as Arc<dyn lexrag_ingest::Crawler>
        })
        .collect();

    let mut config = PipelineConfig::from_settings(&settings);
    config.recreate_collection = cli.recreate;

    let pipeline = IngestionPipeline::new(
        checkpoints,
        crawlers,
        Arc::new(HashedEmbedder::default()),
        Arc::new(MemoryVectorStore::new()),
        &settings,
        config,
    );

    let run_id = cli
        .resume
        .clone()
        .unwrap_or_else(IngestionState::generate_run_id);

    let tracker = UpdateTracker::new(cli.checkpoint_dir.join("last_update.json"));
    let since = if cli.update {
        match tracker.last_update().await {
            Ok(date) => date,
            Err(err) => {
                tracing::error!(error = %err, "unable to read update tracker");
                return ExitCode::from(1);
            }
        }
    } else {
        None
    };

    tokio::select! {
        result = pipeline.run(&run_id, since) => match result {
            Ok(state) => {
                if state.status == RunStatus::Completed
                    && cli.update
                    && let Err(err) = tracker.record(Utc::now().date_naive(), &run_id).await
                {
                    tracing::error!(error = %err, "unable to persist update tracker");
                    return ExitCode::from(1);
                }
                tracing::info!(
                    run_id,
                    chunks = state.chunks_created,
                    vectors = state.vectors_uploaded,
                    "ingestion finished"
                );
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(run_id, error = %err, "ingestion failed");
                ExitCode::from(1)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            if let Err(err) = pipeline.mark_interrupted(&run_id).await {
                tracing::error!(run_id, error = %err, "unable to mark run interrupted");
            }
            tracing::warn!(run_id, "interrupted, checkpoint preserved for resume");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
