//! The resumable bulk-ingestion pipeline.
//!
//! ```text
//! init collection ─► fetch ─► normalize ─► chunk ─► embed+upsert ─► complete
//!                      │          │          │            │
//!                      └──────────┴── CheckpointStore ────┘
//!                                   (state.json + JSONL artifacts)
//! ```
//!
//! Every stage persists its artifact and counters before the next stage
//! starts; chunking and embedding additionally checkpoint after every
//! batch. A rerun of the same `run_id` recomputes its position from the
//! counters and artifacts and continues where the previous process died.

use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use lexrag::Settings;
use lexrag::parser::Chunker;
use lexrag::ports::{DistanceMetric, Embedder, VectorPoint, VectorStore};
use lexrag::types::Chunk;

use crate::checkpoint::{
    CHUNKS_FILE, CheckpointStore, DOCUMENTS_FILE, NORMALIZED_FILE, SKIPPED_FILE,
};
use crate::chunking::{SkippedDocument, chunk_batch};
use crate::errors::IngestError;
use crate::records::{CorpusRecord, Crawler, normalize_records};
use crate::state::{IngestionState, RunStatus};

/// Ingestion batching and timeout knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub embedding_batch_size: usize,
    pub chunk_batch_size: usize,
    pub batch_timeout: Duration,
    pub doc_timeout: Duration,
    pub recreate_collection: bool,
}

impl PipelineConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            embedding_batch_size: settings.embedding_batch_size,
            chunk_batch_size: settings.chunk_batch_size,
            batch_timeout: settings.batch_timeout,
            doc_timeout: settings.doc_timeout,
            recreate_collection: false,
        }
    }
}

/// Stable numeric point id: the leading 64 bits of md5 over the chunk id.
/// Collision-resistant across pipelines that derive their chunk ids
/// differently.
#[must_use]
pub fn numeric_chunk_id(chunk_id: &str) -> u64 {
    use md5::{Digest, Md5};
    let digest = hex::encode(Md5::digest(chunk_id.as_bytes()));
    u64::from_str_radix(&digest[..16], 16).expect("16 hex chars fit in u64")
}

/// Drives one corpus build from crawl to uploaded vectors.
pub struct IngestionPipeline {
    checkpoints: CheckpointStore,
    crawlers: Vec<Arc<dyn Crawler>>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    chunker: Chunker,
    config: PipelineConfig,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        checkpoints: CheckpointStore,
        crawlers: Vec<Arc<dyn Crawler>>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        settings: &Settings,
        config: PipelineConfig,
    ) -> Self {
        Self {
            checkpoints,
            crawlers,
            embedder,
            vectors,
            chunker: Chunker::from_settings(settings),
            config,
        }
    }

    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run (or resume) the pipeline for `run_id`. `since` switches to
    /// incremental mode: crawlers only return records created on or after
    /// that date, and an empty increment completes without touching the
    /// vector store.
    pub async fn run(
        &self,
        run_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<IngestionState, IngestError> {
        let mut state = match self.checkpoints.load_state(run_id).await? {
            Some(state) if state.status == RunStatus::Completed => {
                tracing::info!(run_id, "run already completed, nothing to do");
                return Ok(state);
            }
            Some(mut state) => {
                tracing::info!(run_id, from = ?state.status, "resuming run");
                state.status = RunStatus::Running;
                state
            }
            None => {
                tracing::info!(run_id, "starting new run");
                IngestionState::new(run_id)
            }
        };
        self.checkpoints.save_state(&mut state).await?;

        match self.execute(&mut state, since).await {
            Ok(()) => Ok(state),
            Err(err) => {
                state.record_error(err.to_string());
                self.checkpoints.save_state(&mut state).await?;
                Err(err)
            }
        }
    }

    /// Flag a run as interrupted (signal handling lives in the caller).
    pub async fn mark_interrupted(&self, run_id: &str) -> Result<(), IngestError> {
        if let Some(mut state) = self.checkpoints.load_state(run_id).await?
            && state.status == RunStatus::Running
        {
            state.status = RunStatus::Interrupted;
            self.checkpoints.save_state(&mut state).await?;
            tracing::warn!(run_id, "run interrupted");
        }
        Ok(())
    }

    async fn execute(
        &self,
        state: &mut IngestionState,
        since: Option<NaiveDate>,
    ) -> Result<(), IngestError> {
        let run_id = state.run_id.clone();

        // Stage 0: the collection must exist before vectors arrive.
        self.vectors
            .create_collection(
                self.embedder.dim(),
                DistanceMetric::Cosine,
                self.config.recreate_collection,
            )
            .await
            .map_err(IngestError::Core)?;

        // Stage 1: fetch.
        if state.documents_fetched == 0
            && !self.checkpoints.artifact_nonempty(&run_id, DOCUMENTS_FILE).await
        {
            let mut documents = Vec::new();
            for crawler in &self.crawlers {
                let records = crawler.fetch(since).await.map_err(IngestError::Core)?;
                tracing::info!(crawler = crawler.name(), records = records.len(), "fetched");
                documents.extend(records);
            }

            if documents.is_empty() && since.is_some() {
                tracing::info!(run_id, "no new records since last update");
                state.status = RunStatus::Completed;
                self.checkpoints.save_state(state).await?;
                return Ok(());
            }

            self.checkpoints
                .save_jsonl(&run_id, DOCUMENTS_FILE, &documents)
                .await?;
            state.documents_fetched = documents.len() as u64;
            self.checkpoints.save_state(state).await?;
        } else {
            tracing::info!(run_id, "fetch stage already done, skipping");
        }

        // Stage 2: normalize.
        if state.documents_normalized == 0
            && !self.checkpoints.artifact_nonempty(&run_id, NORMALIZED_FILE).await
        {
            let documents: Vec<CorpusRecord> =
                self.checkpoints.load_jsonl(&run_id, DOCUMENTS_FILE).await?;
            let normalized = normalize_records(documents);
            self.checkpoints
                .save_jsonl(&run_id, NORMALIZED_FILE, &normalized)
                .await?;
            state.documents_normalized = normalized.len() as u64;
            self.checkpoints.save_state(state).await?;
        } else {
            tracing::info!(run_id, "normalize stage already done, skipping");
        }

        // Stage 3: chunk, in batches, resumable at document granularity.
        self.chunk_stage(state).await?;

        // Stage 4: embed + upsert, resumable at batch granularity.
        self.embed_stage(state).await?;

        // Stage 5: verify counters and complete.
        state.status = RunStatus::Completed;
        self.checkpoints.save_state(state).await?;
        tracing::info!(
            run_id,
            documents = state.documents_fetched,
            chunks = state.chunks_created,
            vectors = state.vectors_uploaded,
            "run completed"
        );
        Ok(())
    }

    /// Chunk every normalized record that is not yet accounted for in
    /// `chunks.jsonl` or the skip list. A rerun after a mid-stage crash
    /// picks up exactly the unprocessed documents.
    async fn chunk_stage(&self, state: &mut IngestionState) -> Result<(), IngestError> {
        let run_id = state.run_id.clone();
        let records: Vec<CorpusRecord> =
            self.checkpoints.load_jsonl(&run_id, NORMALIZED_FILE).await?;

        let mut accounted: FxHashSet<String> = self
            .checkpoints
            .load_jsonl::<Chunk>(&run_id, CHUNKS_FILE)
            .await?
            .into_iter()
            .map(|c| c.doc_id)
            .collect();
        let mut skipped: Vec<SkippedDocument> = self
            .checkpoints
            .load_json_or_default(&run_id, SKIPPED_FILE)
            .await?;
        accounted.extend(skipped.iter().map(|s| s.doc_id.clone()));

        let pending: Vec<CorpusRecord> = records
            .into_iter()
            .filter(|r| !accounted.contains(&r.doc_id))
            .collect();
        if pending.is_empty() {
            tracing::info!(run_id, "chunk stage already done, skipping");
            return Ok(());
        }

        let total_batches = pending.len().div_ceil(self.config.chunk_batch_size);
        for (index, batch) in pending.chunks(self.config.chunk_batch_size).enumerate() {
            let outcome = chunk_batch(
                batch,
                self.chunker,
                self.config.doc_timeout,
                self.config.batch_timeout,
            )
            .await;

            self.checkpoints
                .append_jsonl(&run_id, CHUNKS_FILE, &outcome.chunks)
                .await?;
            state.chunks_created += outcome.chunks.len() as u64;

            if !outcome.skipped.is_empty() {
                skipped.extend(outcome.skipped);
                self.checkpoints
                    .save_json(&run_id, SKIPPED_FILE, &skipped)
                    .await?;
            }
            self.checkpoints.save_state(state).await?;
            tracing::info!(
                run_id,
                batch = index + 1,
                total_batches,
                chunks_total = state.chunks_created,
                "chunk batch committed"
            );
        }

        if !skipped.is_empty() {
            tracing::warn!(run_id, skipped = skipped.len(), "documents skipped during chunking");
        }
        Ok(())
    }

    /// Embed and upload everything past `vectors_uploaded`.
    async fn embed_stage(&self, state: &mut IngestionState) -> Result<(), IngestError> {
        let run_id = state.run_id.clone();
        let chunks: Vec<Chunk> = self.checkpoints.load_jsonl(&run_id, CHUNKS_FILE).await?;

        let already = state.vectors_uploaded as usize;
        if already >= chunks.len() {
            tracing::info!(run_id, "embed stage already done, skipping");
            return Ok(());
        }

        for batch in chunks[already..].chunks(self.config.embedding_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(IngestError::Core)?;

            let points: Vec<VectorPoint> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(mut chunk, vector)| {
                    chunk.embedding = Some(vector.clone());
                    VectorPoint {
                        numeric_id: numeric_chunk_id(&chunk.chunk_id),
                        chunk,
                        vector,
                    }
                })
                .collect();
            let uploaded = points.len();
            self.vectors.upsert(points).await.map_err(IngestError::Core)?;

            state.vectors_uploaded += uploaded as u64;
            self.checkpoints.save_state(state).await?;
            tracing::info!(run_id, vectors_total = state.vectors_uploaded, "embed batch committed");
        }
        Ok(())
    }
}
