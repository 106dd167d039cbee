//! Sentence splitting with language/domain awareness.
//!
//! Two tiers: a language-aware splitter that protects abbreviations before
//! cutting on terminal punctuation, and a bare regex fallback for languages
//! without a registered module. Both produce offsets into the normalized
//! text and honor a minimum sentence length.

use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock};

use super::ModuleKey;
use super::citation::CitationExtractor;

/// Minimum sentence length in characters.
pub const MIN_SENTENCE_CHARS: usize = 3;

static TERMINAL_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("terminal punctuation pattern"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// One sentence with offsets into the normalized answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub index: usize,
    pub has_citation: bool,
}

/// Language module for sentence boundary detection.
pub trait SentenceSplitter: Send + Sync {
    /// Normalize text before splitting (abbreviation expansion, whitespace
    /// collapse).
    fn normalize(&self, text: &str) -> String;

    /// Split normalized text into `(sentence, start, end)` byte ranges.
    fn split(&self, normalized: &str, min_chars: usize) -> Vec<(String, usize, usize)>;
}

/// Shared splitting pass: cut after every terminal-punctuation run that is
/// followed by whitespace or the end of text.
fn split_on_terminals(text: &str, min_chars: usize) -> Vec<(String, usize, usize)> {
    let mut sentences = Vec::new();
    let mut cursor = 0;

    let mut push = |raw_start: usize, raw_end: usize, sentences: &mut Vec<(String, usize, usize)>| {
        let raw = &text[raw_start..raw_end];
        let trimmed = raw.trim();
        if trimmed.chars().count() >= min_chars {
            let lead = raw.len() - raw.trim_start().len();
            let start = raw_start + lead;
            sentences.push((trimmed.to_string(), start, start + trimmed.len()));
        }
    };

    for m in TERMINAL_PUNCTUATION.find_iter(text) {
        let punct_end = m.start() + m.as_str().trim_end().len();
        push(cursor, punct_end, &mut sentences);
        cursor = m.end();
    }
    if cursor < text.len() {
        push(cursor, text.len(), &mut sentences);
    }

    sentences
}

/// German legal splitter: expands dotted abbreviations so they stop looking
/// like sentence boundaries, then splits on terminal punctuation.
pub struct GermanLegalSplitter {
    abbreviations: Vec<(&'static str, &'static str)>,
}

impl Default for GermanLegalSplitter {
    fn default() -> Self {
        // Longer forms first so compounds expand before their parts.
        Self {
            abbreviations: vec![
                ("i. V. m.", "in Verbindung mit"),
                ("i.V.m.", "in Verbindung mit"),
                ("z. B.", "zum Beispiel"),
                ("z.B.", "zum Beispiel"),
                ("d. h.", "das heißt"),
                ("d.h.", "das heißt"),
                ("u. a.", "unter anderem"),
                ("u.a.", "unter anderem"),
                ("Abs.", "Absatz"),
                ("Ziff.", "Ziffer"),
                ("Nr.", "Nummer"),
                ("lit.", "litera"),
                ("vgl.", "vergleiche"),
                ("bzw.", "beziehungsweise"),
                ("ggf.", "gegebenenfalls"),
                ("gem.", "gemäß"),
                ("Rn.", "Randnummer"),
                ("S.", "Satz"),
            ],
        }
    }
}

impl GermanLegalSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SentenceSplitter for GermanLegalSplitter {
    fn normalize(&self, text: &str) -> String {
        let mut normalized = text.to_string();
        for (abbreviation, expansion) in &self.abbreviations {
            normalized = normalized.replace(abbreviation, expansion);
        }
        WHITESPACE_RUNS.replace_all(&normalized, " ").trim().to_string()
    }

    fn split(&self, normalized: &str, min_chars: usize) -> Vec<(String, usize, usize)> {
        split_on_terminals(normalized, min_chars)
    }
}

/// Deterministic regex fallback without any language knowledge.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSplitter;

impl SentenceSplitter for FallbackSplitter {
    fn normalize(&self, text: &str) -> String {
        WHITESPACE_RUNS.replace_all(text, " ").trim().to_string()
    }

    fn split(&self, normalized: &str, min_chars: usize) -> Vec<(String, usize, usize)> {
        split_on_terminals(normalized, min_chars)
    }
}

/// Registry of splitters keyed by (language, domain).
pub struct SplitterRegistry {
    splitters: FxHashMap<ModuleKey, Arc<dyn SentenceSplitter>>,
    fallback: Arc<dyn SentenceSplitter>,
}

impl Default for SplitterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            splitters: FxHashMap::default(),
            fallback: Arc::new(FallbackSplitter),
        };
        registry.register(ModuleKey::new("de", "legal"), Arc::new(GermanLegalSplitter::new()));
        registry
    }
}

impl SplitterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: ModuleKey, splitter: Arc<dyn SentenceSplitter>) {
        self.splitters.insert(key, splitter);
    }

    /// Splitter for a key, or the regex fallback.
    #[must_use]
    pub fn get(&self, key: &ModuleKey) -> Arc<dyn SentenceSplitter> {
        self.splitters
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A fully processed answer ready for semantic verification.
#[derive(Debug, Clone)]
pub struct ProcessedAnswer {
    pub normalized: String,
    pub sentences: Vec<SentenceSpan>,
    pub citations: Vec<String>,
}

/// Composes a splitter with a citation extractor to turn a raw answer into
/// flagged sentence spans.
pub struct SentenceProcessor {
    splitter: Arc<dyn SentenceSplitter>,
    citations: Arc<dyn CitationExtractor>,
}

impl SentenceProcessor {
    #[must_use]
    pub fn new(splitter: Arc<dyn SentenceSplitter>, citations: Arc<dyn CitationExtractor>) -> Self {
        Self { splitter, citations }
    }

    /// Normalize, split, and flag an answer. Citations are extracted from
    /// the original text so abbreviation expansion cannot distort them.
    #[must_use]
    pub fn process(&self, answer: &str) -> ProcessedAnswer {
        let normalized = self.splitter.normalize(answer);
        let sentences = self
            .splitter
            .split(&normalized, MIN_SENTENCE_CHARS)
            .into_iter()
            .enumerate()
            .map(|(index, (text, start, end))| {
                let has_citation = !self.citations.extract(&text).is_empty();
                SentenceSpan {
                    text,
                    start,
                    end,
                    index,
                    has_citation,
                }
            })
            .collect();
        let citations = self.citations.extract(answer);

        ProcessedAnswer {
            normalized,
            sentences,
            citations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::citation::LegalCitationExtractor;

    fn processor() -> SentenceProcessor {
        SentenceProcessor::new(
            Arc::new(GermanLegalSplitter::new()),
            Arc::new(LegalCitationExtractor::new()),
        )
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let processed = processor().process("Erster Satz. Zweiter Satz! Dritter Satz?");
        let texts: Vec<&str> = processed.sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["Erster Satz.", "Zweiter Satz!", "Dritter Satz?"]);
    }

    #[test]
    fn abbreviations_do_not_split_sentences() {
        let processed = processor().process("Nach § 823 Abs. 1 BGB haftet der Schädiger. Das gilt stets.");
        assert_eq!(processed.sentences.len(), 2);
        assert!(processed.sentences[0].text.contains("Absatz 1"));
    }

    #[test]
    fn offsets_point_into_the_normalized_text() {
        let processed = processor().process("Kurz.   Noch ein Satz hier.");
        for sentence in &processed.sentences {
            assert_eq!(
                &processed.normalized[sentence.start..sentence.end],
                sentence.text
            );
        }
    }

    #[test]
    fn short_fragments_are_dropped() {
        let processed = processor().process("Ja. A. Dieser Satz bleibt bestehen.");
        let texts: Vec<&str> = processed.sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["Ja.", "Dieser Satz bleibt bestehen."]);
    }

    #[test]
    fn trailing_text_without_punctuation_is_kept() {
        let processed = processor().process("Erster Satz. und dann bricht es ab");
        assert_eq!(processed.sentences.len(), 2);
        assert_eq!(processed.sentences[1].text, "und dann bricht es ab");
    }

    #[test]
    fn citation_flags_per_sentence() {
        let processed = processor().process("§ 823 BGB regelt die Haftung. Morgen regnet es.");
        assert!(processed.sentences[0].has_citation);
        assert!(!processed.sentences[1].has_citation);
        assert_eq!(processed.citations, ["§ 823"]);
    }

    #[test]
    fn sentence_indexes_are_sequential() {
        let processed = processor().process("Eins hier. Zwei dort. Drei fort.");
        let indexes: Vec<usize> = processed.sentences.iter().map(|s| s.index).collect();
        assert_eq!(indexes, [0, 1, 2]);
    }

    #[test]
    fn fallback_splitter_handles_unknown_language() {
        let registry = SplitterRegistry::new();
        let splitter = registry.get(&ModuleKey::new("fr", "legal"));
        let normalized = splitter.normalize("Une phrase. Deux phrases.");
        assert_eq!(splitter.split(&normalized, 3).len(), 2);
    }
}
