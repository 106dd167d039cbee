//! Resumable bulk ingestion for the lexrag vector index.
//!
//! ```text
//! Crawlers ─► normalize ─► chunk (batched, timeouts) ─► embed ─► upsert
//!     │           │             │                          │
//!     └───────────┴──── CheckpointStore per stage ─────────┘
//!                       (atomic state.json + JSONL artifacts)
//! ```
//!
//! A run is identified by a timestamp-based id; killing the process at any
//! point leaves a consistent checkpoint, and rerunning the same id resumes
//! at batch granularity. Incremental mode asks crawlers only for records
//! newer than the last successful run.

pub mod checkpoint;
pub mod chunking;
pub mod crawlers;
pub mod errors;
pub mod pipeline;
pub mod records;
pub mod state;
pub mod update;

pub use checkpoint::CheckpointStore;
pub use chunking::{BatchOutcome, SkippedDocument};
pub use crawlers::JsonlCrawler;
pub use errors::IngestError;
pub use pipeline::{IngestionPipeline, PipelineConfig, numeric_chunk_id};
pub use records::{CorpusRecord, Crawler};
pub use state::{IngestionState, RunStatus};
pub use update::UpdateTracker;
