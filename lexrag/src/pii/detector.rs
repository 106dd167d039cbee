//! Heuristic regex-based PII detector.
//!
//! This is the pluggable default behind the [`PiiDetector`] port: good
//! enough for tests and development, replaceable by an NER-backed detector
//! in production. Detection quality is explicitly the detector's own
//! concern; the anonymizer only depends on ordered, non-overlapping spans.

use regex::Regex;
use std::sync::LazyLock;

use crate::ports::{PiiDetector, PiiKind, PiiSpan};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});
static IBAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{12,30}\b").expect("iban pattern"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+\d{1,3}[\s/-]?\d(?:[\s/-]?\d){6,12}|\b0\d{2,4}[\s/-]\d{4,8}\b")
        .expect("phone pattern")
});
// Honorific-introduced names ("Herr Müller", "Dr. Anna Schmidt").
static TITLED_PERSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Herr|Frau|Dr\.|Prof\.)\s+[A-ZÄÖÜ][a-zäöüß]+(?:\s+[A-ZÄÖÜ][a-zäöüß]+)?",
    )
    .expect("titled person pattern")
});
// Bare capitalized first/last pairs ("Jane Doe"). Heuristic; leading
// function words are filtered below.
static NAME_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-ZÄÖÜ][a-zäöüß]+\s+[A-ZÄÖÜ][a-zäöüß]+\b").expect("name pair pattern")
});

/// Capitalized words that start a sentence, a heading, or a context block
/// far more often than a name.
const NAME_STOPWORDS: &[&str] = &[
    "Der", "Die", "Das", "Den", "Dem", "Des", "Ein", "Eine", "Einer", "Eines", "Nach", "Laut",
    "Wer", "Wie", "Was", "Wird", "Wenn", "Wann", "Sofern", "Gilt", "Haftet", "Muss", "Kann",
    "Darf", "Hat", "Ist", "Sind", "Diese", "Dieser", "Dieses", "Contact", "Kontakt", "Retrieved",
    "Target", "Parent", "Related", "Relevance",
];

/// Regex-backed detector covering EMAIL, IBAN, PHONE, and PERSON spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexPiiDetector;

impl RegexPiiDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn collect(regex: &Regex, kind: PiiKind, text: &str, spans: &mut Vec<PiiSpan>) {
        for m in regex.find_iter(text) {
            spans.push(PiiSpan {
                start: m.start(),
                end: m.end(),
                kind,
                value: m.as_str().to_string(),
            });
        }
    }

    /// Name pairs need a manual scan: when a match starts with a stopword
    /// ("Haftet Erika …"), the real name begins at the second word, so the
    /// scan resumes there instead of after the whole match.
    fn collect_name_pairs(text: &str, spans: &mut Vec<PiiSpan>) {
        let mut pos = 0;
        while let Some(m) = NAME_PAIR.find_at(text, pos) {
            let first_word = m.as_str().split_whitespace().next().unwrap_or_default();
            if NAME_STOPWORDS.contains(&first_word) {
                pos = m.start() + first_word.len();
                continue;
            }
            spans.push(PiiSpan {
                start: m.start(),
                end: m.end(),
                kind: PiiKind::Person,
                value: m.as_str().to_string(),
            });
            pos = m.end();
        }
    }
}

impl PiiDetector for RegexPiiDetector {
    fn detect(&self, text: &str) -> Vec<PiiSpan> {
        // Collection order doubles as precedence: a person-looking span
        // inside an email address must not shadow the email.
        let mut candidates = Vec::new();
        Self::collect(&EMAIL, PiiKind::Email, text, &mut candidates);
        Self::collect(&IBAN, PiiKind::Iban, text, &mut candidates);
        Self::collect(&PHONE, PiiKind::Phone, text, &mut candidates);
        Self::collect(&TITLED_PERSON, PiiKind::Person, text, &mut candidates);
        Self::collect_name_pairs(text, &mut candidates);

        // Drop spans overlapping an already accepted higher-precedence span,
        // then return the survivors in document order.
        let mut accepted: Vec<PiiSpan> = Vec::with_capacity(candidates.len());
        for span in candidates {
            let overlaps = accepted
                .iter()
                .any(|kept| span.start < kept.end && kept.start < span.end);
            if !overlaps {
                accepted.push(span);
            }
        }
        accepted.sort_by_key(|s| s.start);
        accepted
    }
}
