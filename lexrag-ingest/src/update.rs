//! Incremental-update bookkeeping.
//!
//! Persists the date of the last successful run so update-mode ingestion
//! can ask crawlers only for records created since then.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::errors::IngestError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UpdateMark {
    last_update: NaiveDate,
    run_id: String,
}

/// File-backed cursor for incremental runs.
#[derive(Debug, Clone)]
pub struct UpdateTracker {
    path: PathBuf,
}

impl UpdateTracker {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Date of the last successful run, if any.
    pub async fn last_update(&self) -> Result<Option<NaiveDate>, IngestError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(IngestError::io(&self.path, err)),
        };
        let mark: UpdateMark = serde_json::from_slice(&bytes)?;
        Ok(Some(mark.last_update))
    }

    /// Record a successful run. Atomic tmp + rename write.
    pub async fn record(&self, date: NaiveDate, run_id: &str) -> Result<(), IngestError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| IngestError::io(parent, err))?;
        }
        let payload = serde_json::to_vec_pretty(&UpdateMark {
            last_update: date,
            run_id: run_id.to_string(),
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, payload)
            .await
            .map_err(|err| IngestError::io(&tmp, err))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| IngestError::io(&self.path, err))
    }
}
