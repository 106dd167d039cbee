//! Citation recognition in generated prose.
//!
//! Extractors are pluggable by domain; the shipped legal extractor reuses
//! the parser's marker table, so anything the parser would treat as a
//! section marker counts as a citation.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::parser::DocumentParser;
use crate::types::RetrievalResult;

use super::ModuleKey;

/// Domain-specific citation recognizer.
pub trait CitationExtractor: Send + Sync {
    /// Citations found in `text`, unique, in first-occurrence order.
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Legal citations via the parser's section-marker table.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegalCitationExtractor;

impl LegalCitationExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CitationExtractor for LegalCitationExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        DocumentParser::new().extract_section_ids(text)
    }
}

/// Extractor that never finds citations, for domains without a citation
/// concept.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCitationExtractor;

impl CitationExtractor for NoCitationExtractor {
    fn extract(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Registry of citation extractors keyed by (language, domain).
pub struct CitationRegistry {
    extractors: FxHashMap<ModuleKey, Arc<dyn CitationExtractor>>,
    fallback: Arc<dyn CitationExtractor>,
}

impl Default for CitationRegistry {
    fn default() -> Self {
        let mut registry = Self {
            extractors: FxHashMap::default(),
            fallback: Arc::new(NoCitationExtractor),
        };
        registry.register(ModuleKey::new("de", "legal"), Arc::new(LegalCitationExtractor));
        registry
    }
}

impl CitationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: ModuleKey, extractor: Arc<dyn CitationExtractor>) {
        self.extractors.insert(key, extractor);
    }

    /// Extractor for a key, or the no-op fallback.
    #[must_use]
    pub fn get(&self, key: &ModuleKey) -> Arc<dyn CitationExtractor> {
        self.extractors
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A citation matched (or not) against the retrieved sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub section_id: String,
    pub content: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

/// Characters of source content carried into a citation response.
const CITATION_CONTENT_CHARS: usize = 500;

/// Match cited section ids against the retrieval results that produced the
/// answer. A citation without a backing chunk keeps confidence 0 — the
/// model referenced something it was never shown.
#[must_use]
pub fn match_citations(cited_ids: &[String], results: &[RetrievalResult]) -> Vec<Citation> {
    cited_ids
        .iter()
        .map(|section_id| {
            let needle = section_id.to_lowercase();
            let matched = results.iter().find(|r| {
                r.section_id.to_lowercase().contains(&needle)
                    || r.content.to_lowercase().contains(&needle)
            });
            match matched {
                Some(result) => Citation {
                    section_id: section_id.clone(),
                    content: result.content.chars().take(CITATION_CONTENT_CHARS).collect(),
                    confidence: result.similarity,
                    chunk_id: Some(result.chunk_id.clone()),
                },
                None => {
                    tracing::warn!(section_id, "citation not found in retrieved chunks");
                    Citation {
                        section_id: section_id.clone(),
                        content: "[Citation not found in retrieved sections]".to_string(),
                        confidence: 0.0,
                        chunk_id: None,
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(section: &str, content: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_id: format!("chunk-{section}"),
            section_id: section.into(),
            content: content.into(),
            similarity,
            parent_content: None,
            sibling_contents: vec![],
        }
    }

    #[test]
    fn legal_extractor_finds_markers() {
        let citations = LegalCitationExtractor::new()
            .extract("Nach § 823 Abs. 1 haftet der Schädiger, vgl. auch § 276.");
        assert_eq!(citations, ["§ 823", "Abs. 1", "§ 276"]);
    }

    #[test]
    fn registry_falls_back_to_no_citations() {
        let registry = CitationRegistry::new();
        let extractor = registry.get(&ModuleKey::new("en", "medical"));
        assert!(extractor.extract("see section 4 of the trial protocol").is_empty());

        let legal = registry.get(&ModuleKey::new("de", "legal"));
        assert_eq!(legal.extract("§ 1 BGB"), ["§ 1"]);
    }

    #[test]
    fn matched_citation_inherits_similarity() {
        let results = vec![result("§ 823", "Wer vorsätzlich ...", 0.91)];
        let citations = match_citations(&["§ 823".to_string()], &results);
        assert_eq!(citations.len(), 1);
        assert!((citations[0].confidence - 0.91).abs() < f32::EPSILON);
        assert!(citations[0].chunk_id.is_some());
    }

    #[test]
    fn unmatched_citation_scores_zero() {
        let results = vec![result("§ 1", "anderes Thema", 0.8)];
        let citations = match_citations(&["§ 999".to_string()], &results);
        assert_eq!(citations[0].confidence, 0.0);
        assert!(citations[0].chunk_id.is_none());
    }

    #[test]
    fn citation_matched_by_content_mention() {
        let results = vec![result("Abs. 2", "siehe § 433 für den Kaufvertrag", 0.75)];
        let citations = match_citations(&["§ 433".to_string()], &results);
        assert!(citations[0].chunk_id.is_some());
    }
}
