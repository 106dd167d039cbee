//! Error kinds specific to the ingestion pipeline.

use std::path::Path;
use thiserror::Error;

use lexrag::LexError;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Failure in a core component (embedder, vector store, parser).
    #[error(transparent)]
    Core(#[from] LexError),

    /// Filesystem failure while reading or writing a checkpoint artifact.
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// `state.json` exists but is unreadable or missing required fields.
    /// The run cannot resume and must be failed.
    #[error("checkpoint corrupted at {path}: {reason}")]
    CheckpointCorrupted { path: String, reason: String },

    /// A record or artifact line could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IngestError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
