//! Hierarchical parser for legal documents.
//!
//! ```text
//! raw text ──► normalize ──► find markers ──► section bodies ──► hierarchy
//!                                                                  │
//!                                 Chunker ◄── ordered [Section] ◄──┘
//! ```
//!
//! The parser never fails on malformed text: when no marker matches, the
//! whole input degrades to a single top-level section.

pub mod chunker;
pub mod markers;

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{ChunkType, Section};
use markers::find_markers;

pub use chunker::Chunker;

/// Section id assigned when a document carries no recognizable markers.
pub const FALLBACK_SECTION_ID: &str = "document";

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));
static PAGE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Seite\s+\d+\s+von\s+\d+").expect("page header pattern must compile")
});

/// Splits legal text into an ordered [`Section`] list with parent pointers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentParser;

impl DocumentParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a document into hierarchical sections.
    ///
    /// Empty input yields an empty list; input without any marker yields a
    /// single level-0 section covering the whole text.
    #[must_use]
    pub fn parse(&self, text: &str) -> Vec<Section> {
        let normalized = Self::normalize_text(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut sections = Self::extract_sections(&normalized);
        if sections.is_empty() {
            sections.push(Section {
                section_id: FALLBACK_SECTION_ID.to_string(),
                content: normalized,
                level: 0,
                position: 0,
                parent_position: None,
                chunk_type: ChunkType::Section,
            });
            return sections;
        }

        Self::build_hierarchy(&mut sections);
        sections
    }

    /// The unique marker strings occurring in `text`, in first-occurrence
    /// order. Used for citation matching.
    #[must_use]
    pub fn extract_section_ids(&self, text: &str) -> Vec<String> {
        let mut seen = rustc_hash::FxHashSet::default();
        find_markers(text)
            .into_iter()
            .filter(|m| seen.insert(m.section_id.clone()))
            .map(|m| m.section_id)
            .collect()
    }

    /// Canonicalize line endings, drop page headers, collapse whitespace
    /// runs, trim.
    fn normalize_text(text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let without_headers = PAGE_HEADER.replace_all(&unified, "");
        WHITESPACE_RUNS
            .replace_all(&without_headers, " ")
            .trim()
            .to_string()
    }

    /// Content between consecutive markers becomes the section body; empty
    /// bodies are dropped. Position counters assign document order.
    fn extract_sections(text: &str) -> Vec<Section> {
        let markers = find_markers(text);
        let mut sections = Vec::with_capacity(markers.len());
        let mut position = 0;

        for (i, marker) in markers.iter().enumerate() {
            let content_start = marker.end;
            let content_end = markers.get(i + 1).map_or(text.len(), |next| next.start);
            if content_end <= content_start {
                continue;
            }
            let content = text[content_start..content_end].trim();
            if content.is_empty() {
                continue;
            }
            sections.push(Section {
                section_id: marker.section_id.clone(),
                content: content.to_string(),
                level: marker.level,
                position,
                parent_position: None,
                chunk_type: marker.chunk_type,
            });
            position += 1;
        }

        sections
    }

    /// A section's parent is the nearest earlier section with a strictly
    /// lower level. Ties at the same level carry no parent link.
    fn build_hierarchy(sections: &mut [Section]) {
        for i in 0..sections.len() {
            let level = sections[i].level;
            sections[i].parent_position = sections[..i]
                .iter()
                .rev()
                .find(|candidate| candidate.level < level)
                .map(|parent| parent.position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Section> {
        DocumentParser::new().parse(text)
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("   \n\t ").is_empty());
    }

    #[test]
    fn three_sections_with_subsection_parent() {
        let sections = parse("§ 5 Text A. Absatz 1 Text B. § 6 Text C.");
        assert_eq!(sections.len(), 3);

        assert_eq!(sections[0].section_id, "§ 5");
        assert_eq!(sections[0].level, 0);
        assert_eq!(sections[0].parent_position, None);
        assert_eq!(sections[0].content, "Text A.");

        assert_eq!(sections[1].section_id, "Absatz 1");
        assert_eq!(sections[1].level, 1);
        assert_eq!(sections[1].parent_position, Some(0));
        assert_eq!(sections[1].content, "Text B.");

        assert_eq!(sections[2].section_id, "§ 6");
        assert_eq!(sections[2].parent_position, None);
        assert_eq!(sections[2].content, "Text C.");
    }

    #[test]
    fn hierarchy_invariant_holds() {
        let sections = parse("§ 1 a Abs. 1 b Nr. 1 c Abs. 2 d § 2 e Abs. 1 f");
        for section in &sections {
            if let Some(parent) = section.parent_position {
                assert!(parent < section.position);
                assert!(sections[parent].level < section.level);
            }
        }
        // The Abs. inside § 2 attaches there, not to § 1.
        let last = sections.last().unwrap();
        assert_eq!(last.section_id, "Abs. 1");
        assert_eq!(
            sections[last.parent_position.unwrap()].section_id,
            "§ 2"
        );
    }

    #[test]
    fn unmarked_text_degrades_to_single_section() {
        let sections = parse("Ein Vertrag kommt durch Angebot und Annahme zustande.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_id, FALLBACK_SECTION_ID);
        assert_eq!(sections[0].level, 0);
        assert!(sections[0].content.starts_with("Ein Vertrag"));
    }

    #[test]
    fn page_headers_and_line_endings_are_normalized() {
        let sections = parse("§ 7 Erster Teil\r\nSeite 1 von 3\r\nZweiter   Teil");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "Erster Teil Zweiter Teil");
    }

    #[test]
    fn empty_bodies_are_dropped() {
        // "§ 5 Abs. 2" back to back: the § marker has no own body.
        let sections = parse("§ 5 Abs. 2 Inhalt des Absatzes.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_id, "Abs. 2");
        assert_eq!(sections[0].level, 1);
    }

    #[test]
    fn section_id_extraction_is_unique_and_ordered() {
        let parser = DocumentParser::new();
        let ids = parser.extract_section_ids("Nach § 823 und Abs. 1 gilt § 823 ebenso.");
        assert_eq!(ids, ["§ 823", "Abs. 1"]);
    }

    #[test]
    fn positions_are_dense_and_unique() {
        let sections = parse("§ 1 eins § 2 zwei § 3 drei");
        let positions: Vec<usize> = sections.iter().map(|s| s.position).collect();
        assert_eq!(positions, [0, 1, 2]);
    }
}
