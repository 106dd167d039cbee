//! Sentence-level answer verification.
//!
//! Splits a generated answer into sentences, semantically matches each one
//! against the retrieved sources, fuses the signals into a confidence score
//! and trust label, and fingerprints sources and answer so later source
//! mutations invalidate prior verifications.

pub mod citation;
pub mod confidence;
pub mod fingerprint;
pub mod matcher;
pub mod sentence;
pub mod service;

use serde::{Deserialize, Serialize};

pub use citation::{Citation, CitationExtractor, CitationRegistry, LegalCitationExtractor,
    match_citations};
pub use confidence::{ConfidenceEngine, ConfidenceReport, TrustLabel, VerificationSignals, Weights};
pub use fingerprint::{FingerprintTracker, SourceFingerprint, SourceUpdate, VerificationRecord};
pub use matcher::{AnswerVerification, SemanticMatcher, SentenceVerdict};
pub use sentence::{GermanLegalSplitter, ProcessedAnswer, SentenceProcessor, SentenceSpan,
    SentenceSplitter, SplitterRegistry};
pub use service::{RejectReason, SourceRefetcher, SourceSnippet, VerificationOutcome, Verifier};

/// Lookup key for language/domain modules (splitters, citation extractors).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleKey {
    pub language: String,
    pub domain: String,
}

impl ModuleKey {
    #[must_use]
    pub fn new(language: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            domain: domain.into(),
        }
    }
}
