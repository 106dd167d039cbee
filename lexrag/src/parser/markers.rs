//! Section-marker table for German legal text.
//!
//! Markers form an ordered table of `(regex, chunk type, hierarchy level)`.
//! Matching is Unicode case-insensitive. The same table drives both the
//! hierarchical parser and citation extraction in the verifier.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::ChunkType;

/// One row of the marker table.
pub struct MarkerPattern {
    pub regex: Regex,
    pub chunk_type: ChunkType,
    pub level: u8,
}

/// A marker occurrence in a concrete text. Offsets are byte positions.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerMatch {
    pub start: usize,
    pub end: usize,
    pub section_id: String,
    pub chunk_type: ChunkType,
    pub level: u8,
}

static MARKER_TABLE: LazyLock<Vec<MarkerPattern>> = LazyLock::new(|| {
    let rows: [(&str, ChunkType, u8); 11] = [
        // Level 0: main sections (supports subsections like §5.2, §12.3.4)
        (r"(?i)§\s*(\d+(?:\.\d+)*[a-z]?)", ChunkType::Section, 0),
        (
            r"(?i)Artikel\s+(\d+(?:\.\d+)*[a-z]?)",
            ChunkType::Section,
            0,
        ),
        // Level 1: subsections
        (r"(?i)Absatz\s+(\d+)", ChunkType::Subsection, 1),
        (r"(?i)Abs\.\s*(\d+)", ChunkType::Subsection, 1),
        // Level 2: clauses
        (r"(?i)Ziffer\s+(\d+\.?\d*)", ChunkType::Clause, 2),
        (r"(?i)Ziff\.\s*(\d+\.?\d*)", ChunkType::Clause, 2),
        (r"(?i)Nr\.\s*(\d+\.?\d*)", ChunkType::Clause, 2),
        (r"(?i)Nummer\s+(\d+\.?\d*)", ChunkType::Clause, 2),
        // Level 3: sub-clauses
        (r"(?i)Buchstabe\s+([a-z])", ChunkType::Paragraph, 3),
        (r"(?i)lit\.\s*([a-z])", ChunkType::Paragraph, 3),
        (r"\(([a-z])\)", ChunkType::Paragraph, 3),
    ];
    rows.into_iter()
        .map(|(pattern, chunk_type, level)| MarkerPattern {
            regex: Regex::new(pattern).expect("marker pattern must compile"),
            chunk_type,
            level,
        })
        .collect()
});

/// The compiled marker table, ordered by hierarchy level.
#[must_use]
pub fn marker_table() -> &'static [MarkerPattern] {
    &MARKER_TABLE
}

/// Every marker occurrence in `text`, sorted by start offset. Matches from
/// different patterns may interleave; the caller decides how overlaps
/// collapse.
#[must_use]
pub fn find_markers(text: &str) -> Vec<MarkerMatch> {
    let mut markers: Vec<MarkerMatch> = Vec::new();
    for pattern in marker_table() {
        for m in pattern.regex.find_iter(text) {
            markers.push(MarkerMatch {
                start: m.start(),
                end: m.end(),
                section_id: m.as_str().trim().to_string(),
                chunk_type: pattern.chunk_type,
                level: pattern.level,
            });
        }
    }
    markers.sort_by_key(|m| m.start);
    markers
}
