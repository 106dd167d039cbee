//! Persisted state of one ingestion run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a run. Status only moves forward or into a terminal state;
/// a resumed run re-enters `Running` from `Failed` or `Interrupted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl RunStatus {
    /// `Completed` is the only status a run never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Counters and status persisted atomically after each stage and after each
/// batch within a stage. Counters are monotonically non-decreasing within a
/// run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionState {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: RunStatus,
    pub documents_fetched: u64,
    pub documents_normalized: u64,
    pub chunks_created: u64,
    pub vectors_uploaded: u64,
    pub error_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl IngestionState {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            start_time: now,
            last_updated: now,
            status: RunStatus::Running,
            documents_fetched: 0,
            documents_normalized: 0,
            chunks_created: 0,
            vectors_uploaded: 0,
            error_count: 0,
            last_error: None,
        }
    }

    /// Timestamp-based run id, second resolution.
    #[must_use]
    pub fn generate_run_id() -> String {
        Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string()
    }

    /// Record a stage failure.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error_count += 1;
        self.last_error = Some(message.into());
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_running_with_zero_counters() {
        let state = IngestionState::new("run-1");
        assert_eq!(state.status, RunStatus::Running);
        assert_eq!(state.documents_fetched, 0);
        assert_eq!(state.vectors_uploaded, 0);
        assert_eq!(state.error_count, 0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn record_error_flips_to_failed_and_counts() {
        let mut state = IngestionState::new("run-1");
        state.record_error("embedder unreachable");
        state.record_error("embedder unreachable again");
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.error_count, 2);
        assert!(state.last_error.as_deref().unwrap().contains("again"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::Interrupted).unwrap();
        assert_eq!(json, "\"interrupted\"");
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut state = IngestionState::new("2026-08-01T10-00-00");
        state.documents_fetched = 12;
        state.chunks_created = 340;
        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: IngestionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn missing_required_fields_fail_deserialization() {
        let err = serde_json::from_str::<IngestionState>("{\"run_id\": \"r\"}");
        assert!(err.is_err());
    }
}
