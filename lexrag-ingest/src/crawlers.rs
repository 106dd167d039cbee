//! Crawler implementations.
//!
//! Remote corpus crawlers (statute portals, case-law APIs) live behind the
//! [`Crawler`] trait; this module ships the file-backed one the CLI uses
//! and tests build on. Its "wire format" is simply the normalized record,
//! one JSON object per line.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use tokio::fs;

use lexrag::LexError;

use crate::records::{CorpusRecord, Crawler};

/// Reads corpus records from a local JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlCrawler {
    name: String,
    path: PathBuf,
}

impl JsonlCrawler {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Crawler for JsonlCrawler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, since: Option<NaiveDate>) -> Result<Vec<CorpusRecord>, LexError> {
        let content = fs::read_to_string(&self.path).await.map_err(|err| {
            LexError::external("corpus-file", format!("{}: {err}", self.path.display()))
        })?;

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: CorpusRecord = serde_json::from_str(line).map_err(|err| {
                LexError::validation(format!(
                    "{} line {}: {err}",
                    self.path.display(),
                    number + 1
                ))
            })?;
            let fresh = match (since, record.created_date) {
                (Some(cutoff), Some(created)) => created >= cutoff,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if fresh {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record_line(doc_id: &str, created: Option<&str>) -> String {
        let date = created
            .map(|d| format!(",\"created_date\":\"{d}\""))
            .unwrap_or_default();
        format!(
            "{{\"doc_id\":\"{doc_id}\",\"title\":\"T\",\"text\":\"§ 1 Inhalt.\",\"source\":\"file\"{date},\"metadata\":null}}"
        )
    }

    #[tokio::test]
    async fn reads_all_records_without_cutoff() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let content = [
            record_line("a", Some("2026-07-01")),
            String::new(),
            record_line("b", None),
        ]
        .join("\n");
        fs::write(&path, content).await.unwrap();

        let crawler = JsonlCrawler::new("file", &path);
        let records = crawler.fetch(None).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn cutoff_filters_old_and_undated_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let content = [
            record_line("old", Some("2026-01-01")),
            record_line("new", Some("2026-08-01")),
            record_line("undated", None),
        ]
        .join("\n");
        fs::write(&path, content).await.unwrap();

        let crawler = JsonlCrawler::new("file", &path);
        let since = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let records = crawler.fetch(Some(since)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doc_id, "new");
    }

    #[tokio::test]
    async fn missing_file_is_an_external_failure() {
        let crawler = JsonlCrawler::new("file", "/nonexistent/corpus.jsonl");
        assert!(crawler.fetch(None).await.is_err());
    }
}
