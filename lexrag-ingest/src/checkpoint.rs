//! On-disk checkpoint store for resumable runs.
//!
//! Layout per run:
//!
//! ```text
//! <root>/<runId>/
//!   state.json                 atomic write via tmp + rename
//!   documents.jsonl            after fetch
//!   normalized.jsonl           after normalize
//!   chunks.jsonl               after chunk (appendable per batch)
//!   skipped_documents.json     documents that timed out or errored
//! ```
//!
//! Every full-file write goes through a temp file and an atomic rename, so
//! an aborted write never replaces a valid artifact with a partial one.
//! `chunks.jsonl` additionally supports appends for intra-stage batches.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::IngestError;
use crate::state::IngestionState;

pub const STATE_FILE: &str = "state.json";
pub const DOCUMENTS_FILE: &str = "documents.jsonl";
pub const NORMALIZED_FILE: &str = "normalized.jsonl";
pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const SKIPPED_FILE: &str = "skipped_documents.json";

/// Filesystem-backed checkpoint store; one directory per run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    #[must_use]
    pub fn artifact_path(&self, run_id: &str, name: &str) -> PathBuf {
        self.run_dir(run_id).join(name)
    }

    /// Persist the run state atomically, refreshing `last_updated`.
    pub async fn save_state(&self, state: &mut IngestionState) -> Result<(), IngestError> {
        state.touch();
        let path = self.artifact_path(&state.run_id, STATE_FILE);
        let payload = serde_json::to_vec_pretty(state)?;
        self.write_atomic(&path, &payload).await?;
        tracing::debug!(
            run_id = %state.run_id,
            status = ?state.status,
            docs = state.documents_fetched,
            chunks = state.chunks_created,
            vectors = state.vectors_uploaded,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Load a run's state. `None` when the run has no checkpoint yet;
    /// unreadable or field-incomplete state files are corruption.
    pub async fn load_state(&self, run_id: &str) -> Result<Option<IngestionState>, IngestError> {
        let path = self.artifact_path(run_id, STATE_FILE);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(IngestError::io(&path, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| IngestError::CheckpointCorrupted {
                path: path.display().to_string(),
                reason: err.to_string(),
            })
    }

    /// Replace a JSONL artifact atomically, one record per line.
    pub async fn save_jsonl<T: Serialize>(
        &self,
        run_id: &str,
        name: &str,
        items: &[T],
    ) -> Result<(), IngestError> {
        let path = self.artifact_path(run_id, name);
        let mut payload = Vec::new();
        for item in items {
            serde_json::to_writer(&mut payload, item)?;
            payload.push(b'\n');
        }
        self.write_atomic(&path, &payload).await?;
        tracing::info!(run_id, artifact = name, records = items.len(), "artifact saved");
        Ok(())
    }

    /// Append records to a JSONL artifact (intra-stage batch progress).
    pub async fn append_jsonl<T: Serialize>(
        &self,
        run_id: &str,
        name: &str,
        items: &[T],
    ) -> Result<(), IngestError> {
        let path = self.artifact_path(run_id, name);
        self.ensure_run_dir(run_id).await?;

        let mut payload = Vec::new();
        for item in items {
            serde_json::to_writer(&mut payload, item)?;
            payload.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| IngestError::io(&path, err))?;
        file.write_all(&payload)
            .await
            .map_err(|err| IngestError::io(&path, err))?;
        file.flush().await.map_err(|err| IngestError::io(&path, err))?;
        Ok(())
    }

    /// Read a JSONL artifact. Missing files yield an empty list; blank
    /// lines are tolerated.
    pub async fn load_jsonl<T: DeserializeOwned>(
        &self,
        run_id: &str,
        name: &str,
    ) -> Result<Vec<T>, IngestError> {
        let path = self.artifact_path(run_id, name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(IngestError::io(&path, err)),
        };
        let mut items = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            items.push(serde_json::from_str(line)?);
        }
        Ok(items)
    }

    /// Whether an artifact exists and holds at least one byte.
    pub async fn artifact_nonempty(&self, run_id: &str, name: &str) -> bool {
        let path = self.artifact_path(run_id, name);
        fs::metadata(&path).await.map(|m| m.len() > 0).unwrap_or(false)
    }

    /// Read a whole-file JSON artifact, defaulting when the file is absent.
    pub async fn load_json_or_default<T: DeserializeOwned + Default>(
        &self,
        run_id: &str,
        name: &str,
    ) -> Result<T, IngestError> {
        let path = self.artifact_path(run_id, name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(IngestError::io(&path, err)),
        }
    }

    /// Write an arbitrary JSON artifact atomically (`skipped_documents.json`).
    pub async fn save_json<T: Serialize>(
        &self,
        run_id: &str,
        name: &str,
        value: &T,
    ) -> Result<(), IngestError> {
        let path = self.artifact_path(run_id, name);
        let payload = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&path, &payload).await
    }

    /// States of every run under the root, sorted by run id.
    pub async fn list_runs(&self) -> Result<Vec<IngestionState>, IngestError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(IngestError::io(&self.root, err)),
        };
        let mut states = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| IngestError::io(&self.root, err))?
        {
            let run_id = entry.file_name().to_string_lossy().to_string();
            match self.load_state(&run_id).await {
                Ok(Some(state)) => states.push(state),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(run_id, error = %err, "skipping unreadable checkpoint");
                }
            }
        }
        states.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(states)
    }

    /// Remove a run directory and everything in it.
    pub async fn delete_run(&self, run_id: &str) -> Result<bool, IngestError> {
        let dir = self.run_dir(run_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(IngestError::io(&dir, err)),
        }
    }

    async fn ensure_run_dir(&self, run_id: &str) -> Result<(), IngestError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| IngestError::io(&dir, err))
    }

    /// Temp-file-plus-rename write. An aborted write leaves the previous
    /// valid artifact in place.
    async fn write_atomic(&self, path: &Path, payload: &[u8]) -> Result<(), IngestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| IngestError::io(parent, err))?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, payload)
            .await
            .map_err(|err| IngestError::io(&tmp, err))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|err| IngestError::io(path, err))
    }
}
