//! Turns parsed sections into embedding-ready chunks.
//!
//! Sections at or under the size limit become one chunk; larger sections are
//! split with a sliding window and a fixed character overlap. A cut that
//! would land inside a word is snapped back to the last sentence boundary
//! (`". "`) within the window. All sizes and offsets are measured in
//! characters, never bytes.

use crate::config::Settings;
use crate::types::{Chunk, ChunkMetadata, Section};

/// Stable chunk id: first 16 hex chars of SHA-256 over
/// `docId:position:sectionId:splitIndex`. The section position disambiguates
/// repeated markers (`Absatz 1` occurs under many sections of one statute);
/// re-running over identical input reproduces identical ids.
#[must_use]
pub fn chunk_id(doc_id: &str, section_position: usize, section_id: &str, split_index: usize) -> String {
    crate::types::short_hash16(&format!("{doc_id}:{section_position}:{section_id}:{split_index}"))
}

/// Size-bounded chunker with sentence-aware splitting.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// # Panics
    ///
    /// Panics if `chunk_overlap >= max_chunk_size`; such a configuration
    /// cannot make progress.
    #[must_use]
    pub fn new(max_chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(
            chunk_overlap < max_chunk_size,
            "chunk overlap ({chunk_overlap}) must be smaller than the chunk size ({max_chunk_size})"
        );
        Self {
            max_chunk_size,
            chunk_overlap,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_chunk_size, settings.chunk_overlap)
    }

    /// Convert sections into chunks with document-then-split positions,
    /// unique per document.
    #[must_use]
    pub fn chunk(&self, sections: &[Section], doc_id: &str) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(sections.len());
        let mut position = 0;

        for section in sections {
            let parent_section_id = section
                .parent_position
                .and_then(|p| sections.iter().find(|s| s.position == p))
                .map(|parent| parent.section_id.clone());

            if section.content.chars().count() <= self.max_chunk_size {
                chunks.push(Chunk {
                    chunk_id: chunk_id(doc_id, section.position, &section.section_id, 0),
                    doc_id: doc_id.to_string(),
                    section_id: section.section_id.clone(),
                    content: section.content.clone(),
                    chunk_type: section.chunk_type,
                    position,
                    parent_id: parent_section_id,
                    metadata: ChunkMetadata {
                        char_count: section.content.chars().count(),
                        word_count: section.content.split_whitespace().count(),
                        ..Default::default()
                    },
                    embedding: None,
                });
                position += 1;
            } else {
                let split = self.split_section(section, doc_id, position);
                position += split.len();
                chunks.extend(split);
            }
        }

        chunks
    }

    /// Sliding-window split of an oversize section.
    fn split_section(&self, section: &Section, doc_id: &str, start_position: usize) -> Vec<Chunk> {
        let chars: Vec<char> = section.content.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut split_index = 0;

        while start < total {
            let mut end = (start + self.max_chunk_size).min(total);

            // A cut inside a word snaps back to the last ". " in the window.
            if end < total && chars[end - 1].is_alphanumeric() && chars[end].is_alphanumeric() {
                let window: String = chars[start..end].iter().collect();
                if let Some(byte_pos) = window.rfind(". ") {
                    let char_pos = window[..byte_pos].chars().count();
                    if char_pos > 0 {
                        end = start + char_pos + 1;
                    }
                }
            }

            let content: String = chars[start..end].iter().collect::<String>().trim().to_string();
            if !content.is_empty() {
                let split_section_id = format!("{}_{split_index}", section.section_id);
                chunks.push(Chunk {
                    chunk_id: chunk_id(doc_id, section.position, &section.section_id, split_index),
                    doc_id: doc_id.to_string(),
                    section_id: split_section_id,
                    chunk_type: section.chunk_type,
                    position: start_position + split_index,
                    parent_id: Some(section.section_id.clone()),
                    metadata: ChunkMetadata {
                        char_count: content.chars().count(),
                        word_count: content.split_whitespace().count(),
                        is_split: true,
                        split_index: Some(split_index),
                        parent_section_id: Some(section.section_id.clone()),
                    },
                    content,
                    embedding: None,
                });
            }

            if end >= total {
                break;
            }
            // Advance with overlap, but always move forward.
            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
            split_index += 1;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkType;

    fn section(id: &str, content: &str) -> Section {
        Section {
            section_id: id.to_string(),
            content: content.to_string(),
            level: 0,
            position: 0,
            parent_position: None,
            chunk_type: ChunkType::Section,
        }
    }

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(max, overlap)
    }

    #[test]
    fn small_section_is_one_chunk() {
        let chunks = chunker(50, 10).chunk(&[section("§ 1", "Kurzer Text.")], "doc");
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].metadata.is_split);
        assert_eq!(chunks[0].section_id, "§ 1");
        assert_eq!(chunks[0].metadata.char_count, 12);
        assert_eq!(chunks[0].metadata.word_count, 2);
    }

    #[test]
    fn oversize_section_respects_bounds() {
        let content = "Sentence one. Sentence two. Sentence three. Sentence four.";
        let chunks = chunker(50, 10).chunk(&[section("§ 2", content)], "doc");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let len = chunk.content.chars().count();
            assert!(len > 0 && len <= 50, "chunk length {len} out of bounds");
            assert!(chunk.metadata.is_split);
        }
        // Split ids and indexes are monotonically increasing.
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.split_index, Some(i));
            assert_eq!(chunk.section_id, format!("§ 2_{i}"));
            assert_eq!(chunk.metadata.parent_section_id.as_deref(), Some("§ 2"));
        }
    }

    #[test]
    fn exact_overlap_without_sentence_boundaries() {
        // No ". " anywhere and cuts land between words, so the raw window
        // applies and consecutive chunks share exactly the overlap.
        let content = "abcde ".repeat(20); // 120 chars
        let chunks = chunker(30, 6).chunk(&[section("§ 3", content.trim())], "doc");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].content.chars().collect();
            let tail: String = prev[prev.len() - 5..].iter().collect();
            // Trimming eats the boundary space, leaving the 5-char word stem
            // of the 6-char overlap at the head of the next chunk.
            assert!(
                pair[1].content.starts_with(tail.trim()),
                "expected '{}' to start with '{}'",
                pair[1].content,
                tail.trim()
            );
        }
    }

    #[test]
    fn snap_reduces_overlap_never_increases() {
        let content =
            "Erster Satz endet hier. Zweiter Satz ist deutlich laenger und geht weiter. Dritter.";
        let chunks = chunker(40, 10).chunk(&[section("§ 4", content)], "doc");
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 40);
        }
    }

    #[test]
    fn positions_are_unique_across_sections_and_splits() {
        let long = "Wort ".repeat(100);
        let sections = vec![section("§ 1", "kurz"), section("§ 2", long.trim())];
        let chunks = chunker(50, 10).chunk(&sections, "doc");
        let mut positions: Vec<usize> = chunks.iter().map(|c| c.position).collect();
        let expected: Vec<usize> = (0..chunks.len()).collect();
        positions.sort_unstable();
        assert_eq!(positions, expected);
    }

    #[test]
    fn repeated_markers_still_get_unique_chunk_ids() {
        let sections = vec![
            Section {
                section_id: "Abs. 1".into(),
                content: "unter § 5".into(),
                level: 1,
                position: 0,
                parent_position: None,
                chunk_type: ChunkType::Subsection,
            },
            Section {
                section_id: "Abs. 1".into(),
                content: "unter § 6".into(),
                level: 1,
                position: 1,
                parent_position: None,
                chunk_type: ChunkType::Subsection,
            },
        ];
        let chunks = chunker(50, 10).chunk(&sections, "doc");
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }

    #[test]
    fn chunk_ids_are_stable_across_runs() {
        let sections = vec![section("§ 823", "Inhalt")];
        let first = chunker(50, 10).chunk(&sections, "doc-1");
        let second = chunker(50, 10).chunk(&sections, "doc-1");
        assert_eq!(first[0].chunk_id, second[0].chunk_id);

        let other_doc = chunker(50, 10).chunk(&sections, "doc-2");
        assert_ne!(first[0].chunk_id, other_doc[0].chunk_id);
    }

    #[test]
    fn multibyte_content_never_splits_inside_a_char() {
        let content = "Straßenverkehrsordnung äößü ".repeat(30);
        let chunks = chunker(40, 8).chunk(&[section("§ 5", content.trim())], "doc");
        // Reassembling must produce valid strings; any mid-char slice would
        // have panicked during chunking.
        assert!(chunks.iter().all(|c| !c.content.is_empty()));
    }

    #[test]
    fn whole_chunk_carries_parent_section_link() {
        let sections = vec![
            Section {
                section_id: "§ 5".into(),
                content: "Oberteil".into(),
                level: 0,
                position: 0,
                parent_position: None,
                chunk_type: ChunkType::Section,
            },
            Section {
                section_id: "Abs. 1".into(),
                content: "Unterteil".into(),
                level: 1,
                position: 1,
                parent_position: Some(0),
                chunk_type: ChunkType::Subsection,
            },
        ];
        let chunks = chunker(50, 10).chunk(&sections, "doc");
        assert_eq!(chunks[0].parent_id, None);
        assert_eq!(chunks[1].parent_id.as_deref(), Some("§ 5"));
    }
}
