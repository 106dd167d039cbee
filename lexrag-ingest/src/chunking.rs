//! Batched chunking with hard per-document and per-batch timeouts.
//!
//! Chunking is CPU-bound, so each document runs on the blocking pool under
//! a `tokio::time::timeout`. A document that exceeds its limit is recorded
//! in the skip list and the batch continues; once the batch deadline has
//! passed, the remainder of the batch is skipped wholesale. Skipped units
//! are never retried inline.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use lexrag::parser::{Chunker, DocumentParser};
use lexrag::types::Chunk;

use crate::records::CorpusRecord;

/// Why a document was left out of `chunks.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub doc_id: String,
    pub title: String,
    pub reason: String,
}

/// Result of chunking one batch of records.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedDocument>,
}

/// Chunk one batch of documents under a batch deadline, each document under
/// its own timeout.
pub async fn chunk_batch(
    records: &[CorpusRecord],
    chunker: Chunker,
    doc_timeout: Duration,
    batch_timeout: Duration,
) -> BatchOutcome {
    let parser = DocumentParser::new();
    let deadline = Instant::now() + batch_timeout;
    let mut outcome = BatchOutcome::default();

    for record in records {
        if Instant::now() >= deadline {
            tracing::warn!(
                doc_id = %record.doc_id,
                "batch deadline reached, skipping remainder of batch"
            );
            outcome.skipped.push(SkippedDocument {
                doc_id: record.doc_id.clone(),
                title: record.title.clone(),
                reason: "batch_timeout".to_string(),
            });
            continue;
        }

        let doc_id = record.doc_id.clone();
        let text = record.text.clone();
        let work = tokio::task::spawn_blocking(move || {
            let sections = parser.parse(&text);
            chunker.chunk(&sections, &doc_id)
        });

        match tokio::time::timeout(doc_timeout, work).await {
            Ok(Ok(chunks)) => outcome.chunks.extend(chunks),
            Ok(Err(join_error)) => {
                tracing::error!(doc_id = %record.doc_id, error = %join_error, "chunking task failed");
                outcome.skipped.push(SkippedDocument {
                    doc_id: record.doc_id.clone(),
                    title: record.title.clone(),
                    reason: format!("panic: {join_error}"),
                });
            }
            Err(_elapsed) => {
                tracing::warn!(doc_id = %record.doc_id, ?doc_timeout, "document chunking timed out");
                outcome.skipped.push(SkippedDocument {
                    doc_id: record.doc_id.clone(),
                    title: record.title.clone(),
                    reason: "timeout".to_string(),
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc_id: &str, text: &str) -> CorpusRecord {
        CorpusRecord {
            doc_id: doc_id.into(),
            title: format!("Titel {doc_id}"),
            text: text.into(),
            source: "test".into(),
            law: None,
            jurisdiction: None,
            url: None,
            created_date: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn healthy_batch_chunks_everything() {
        let records = vec![
            record("a", "§ 1 Erster Inhalt. § 2 Zweiter Inhalt."),
            record("b", "§ 3 Dritter Inhalt."),
        ];
        let outcome = chunk_batch(
            &records,
            Chunker::new(1600, 100),
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
        .await;
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.chunks.len(), 3);
        assert!(outcome.chunks.iter().any(|c| c.doc_id == "a"));
        assert!(outcome.chunks.iter().any(|c| c.doc_id == "b"));
    }

    #[tokio::test]
    async fn expired_batch_deadline_skips_all_documents() {
        let records = vec![record("a", "§ 1 Text."), record("b", "§ 2 Text.")];
        let outcome = chunk_batch(
            &records,
            Chunker::new(1600, 100),
            Duration::from_secs(30),
            Duration::ZERO,
        )
        .await;
        assert!(outcome.chunks.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
        assert!(outcome.skipped.iter().all(|s| s.reason == "batch_timeout"));
    }
}
