//! Normalized corpus records and the crawler port.
//!
//! Crawler wire formats are the crawlers' own business; the pipeline only
//! sees the normalized record below. Normalization strips control
//! characters and whitespace noise so the parser downstream works on clean
//! text.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lexrag::LexError;

/// One corpus document as produced by a crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub doc_id: String,
    pub title: String,
    pub text: String,
    /// Which crawler produced the record.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub law: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<NaiveDate>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Corpus source. `since` narrows the fetch to records created on or after
/// that date (incremental update mode).
#[async_trait]
pub trait Crawler: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, since: Option<NaiveDate>) -> Result<Vec<CorpusRecord>, LexError>;
}

/// Drop unusable records and clean the text of the rest.
#[must_use]
pub fn normalize_records(records: Vec<CorpusRecord>) -> Vec<CorpusRecord> {
    let total = records.len();
    let normalized: Vec<CorpusRecord> = records
        .into_iter()
        .filter_map(|mut record| {
            record.text = clean_text(&record.text);
            if record.text.is_empty() {
                tracing::warn!(doc_id = %record.doc_id, "dropping record with empty text");
                return None;
            }
            record.title = record.title.trim().to_string();
            Some(record)
        })
        .collect();
    if normalized.len() < total {
        tracing::info!(
            kept = normalized.len(),
            dropped = total - normalized.len(),
            "normalization dropped records"
        );
    }
    normalized
}

/// Canonicalize line endings, strip control characters, collapse runs of
/// blank lines, trim.
fn clean_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let stripped: String = unified
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let mut out = String::with_capacity(stripped.len());
    let mut blank_run = 0;
    for line in stripped.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc_id: &str, text: &str) -> CorpusRecord {
        CorpusRecord {
            doc_id: doc_id.into(),
            title: "  Titel  ".into(),
            text: text.into(),
            source: "test".into(),
            law: None,
            jurisdiction: None,
            url: None,
            created_date: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn control_characters_are_stripped() {
        let records = normalize_records(vec![record("a", "Text\u{0} mit\u{7} Steuerzeichen")]);
        assert_eq!(records[0].text, "Text mit Steuerzeichen");
    }

    #[test]
    fn blank_line_runs_collapse() {
        let records = normalize_records(vec![record("a", "Absatz eins\r\n\r\n\r\n\r\nAbsatz zwei")]);
        assert_eq!(records[0].text, "Absatz eins\n\nAbsatz zwei");
        assert_eq!(records[0].title, "Titel");
    }

    #[test]
    fn empty_records_are_dropped() {
        let records = normalize_records(vec![
            record("keep", "Inhalt"),
            record("drop", "   \n\n  "),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doc_id, "keep");
    }

    #[test]
    fn record_roundtrips_with_optional_fields() {
        let mut r = record("a", "Inhalt");
        r.law = Some("BGB".into());
        r.created_date = NaiveDate::from_ymd_opt(2026, 7, 1);
        let json = serde_json::to_string(&r).unwrap();
        let back: CorpusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
        // Absent optionals stay off the wire.
        let bare = serde_json::to_string(&record("b", "x")).unwrap();
        assert!(!bare.contains("jurisdiction"));
    }
}
