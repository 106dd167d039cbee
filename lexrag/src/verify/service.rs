//! Verification orchestrator.
//!
//! ```text
//! answer ──► SentenceProcessor ──► SemanticMatcher ──► ConfidenceEngine
//!                                        │                   │
//!                              FingerprintTracker ◄──────────┘
//! ```
//!
//! Coordinates splitting, matching, scoring, and fingerprinting, and
//! optionally re-runs the whole pass with refetched sources while the
//! confidence stays under the retry threshold.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::LexError;
use crate::types::RetrievalResult;

use super::confidence::{ConfidenceEngine, ConfidenceReport, TrustLabel, VerificationSignals};
use super::fingerprint::FingerprintTracker;
use super::matcher::SemanticMatcher;
use super::sentence::SentenceProcessor;

/// One source snippet handed to the verifier.
#[derive(Debug, Clone)]
pub struct SourceSnippet {
    pub source_id: String,
    pub text: String,
    /// Retrieval similarity, when the snippet came from the retriever.
    pub score: Option<f32>,
}

impl From<&RetrievalResult> for SourceSnippet {
    fn from(result: &RetrievalResult) -> Self {
        Self {
            source_id: result.section_id.clone(),
            text: result.content.clone(),
            score: Some(result.similarity),
        }
    }
}

/// Why a verification short-circuited to `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoSentences,
    NoSources,
}

/// Per-sentence view carried in the outcome.
#[derive(Debug, Clone)]
pub struct SentenceOutcome {
    pub text: String,
    pub score: f32,
    pub verified: bool,
    pub has_citation: bool,
}

/// Full result of one verification (after retries, if any).
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verification_id: Uuid,
    pub confidence: f32,
    pub trust_label: TrustLabel,
    pub verified: bool,
    pub report: ConfidenceReport,
    pub sentences: Vec<SentenceOutcome>,
    pub citations: Vec<String>,
    pub source_hashes: Vec<String>,
    pub reject_reason: Option<RejectReason>,
    pub retries: u32,
    pub duration_ms: u64,
}

impl VerificationOutcome {
    /// Sentences that failed sentence-level verification.
    #[must_use]
    pub fn unsupported_sentences(&self) -> Vec<String> {
        self.sentences
            .iter()
            .filter(|s| !s.verified)
            .map(|s| s.text.clone())
            .collect()
    }
}

/// Callback that supplies better sources for a retry round.
#[async_trait]
pub trait SourceRefetcher: Send + Sync {
    async fn refetch(
        &self,
        answer: &str,
        confidence: f32,
    ) -> Result<Vec<SourceSnippet>, LexError>;
}

/// Sentence-level answer auditor.
pub struct Verifier {
    processor: SentenceProcessor,
    matcher: SemanticMatcher,
    engine: ConfidenceEngine,
    tracker: Arc<FingerprintTracker>,
    auto_retry_enabled: bool,
    retry_threshold: f32,
    max_retries: u32,
}

impl Verifier {
    #[must_use]
    pub fn new(
        processor: SentenceProcessor,
        matcher: SemanticMatcher,
        engine: ConfidenceEngine,
        tracker: Arc<FingerprintTracker>,
        settings: &Settings,
    ) -> Self {
        Self {
            processor,
            matcher,
            engine,
            tracker,
            auto_retry_enabled: settings.auto_retry_enabled,
            retry_threshold: settings.auto_retry_threshold,
            max_retries: settings.max_retries,
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<FingerprintTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn matcher(&self) -> &SemanticMatcher {
        &self.matcher
    }

    /// Verify an answer against source snippets once.
    pub async fn verify(
        &self,
        answer: &str,
        sources: &[SourceSnippet],
    ) -> Result<VerificationOutcome, LexError> {
        let started = Instant::now();
        let verification_id = Uuid::new_v4();

        let processed = self.processor.process(answer);
        if processed.sentences.is_empty() {
            return Ok(self.rejected(verification_id, started, RejectReason::NoSentences));
        }
        if sources.is_empty() {
            return Ok(self.rejected(verification_id, started, RejectReason::NoSources));
        }

        let sentence_texts: Vec<String> =
            processed.sentences.iter().map(|s| s.text.clone()).collect();
        let source_texts: Vec<String> = sources.iter().map(|s| s.text.clone()).collect();

        let answer_verification = self
            .matcher
            .verify_answer(
                &sentence_texts,
                &source_texts,
                self.engine.sentence_threshold(),
            )
            .await?;

        let signals = VerificationSignals {
            sentence_scores: answer_verification
                .verdicts
                .iter()
                .map(|v| v.max_score)
                .collect(),
            retrieval_scores: sources.iter().filter_map(|s| s.score).collect(),
            citation_count: processed.citations.len(),
            source_count: sources.len(),
        };
        let report = self.engine.calculate(&signals);

        let fingerprints = self.tracker.fingerprint_sources(
            &sources
                .iter()
                .map(|s| (s.source_id.clone(), s.text.clone()))
                .collect::<Vec<_>>(),
        );
        let record = self.tracker.record_verification(
            verification_id,
            answer,
            &fingerprints,
            report.confidence,
            report.trust_label,
        );

        let sentences = processed
            .sentences
            .iter()
            .zip(&answer_verification.verdicts)
            .map(|(span, verdict)| SentenceOutcome {
                text: span.text.clone(),
                score: verdict.max_score,
                verified: verdict.verified,
                has_citation: span.has_citation,
            })
            .collect();

        tracing::info!(
            %verification_id,
            confidence = report.confidence,
            label = %report.trust_label,
            sentences = answer_verification.total_count,
            verified = answer_verification.verified_count,
            "verification complete"
        );

        Ok(VerificationOutcome {
            verification_id,
            confidence: report.confidence,
            trust_label: report.trust_label,
            verified: report.verified,
            report,
            sentences,
            citations: processed.citations,
            source_hashes: record.source_hashes,
            reject_reason: None,
            retries: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Verify with auto-retry: while the confidence stays under the retry
    /// threshold and a refetcher is available, fetch a new source set and
    /// verify again, up to `max_retries` times.
    pub async fn verify_with_retry(
        &self,
        answer: &str,
        sources: Vec<SourceSnippet>,
        refetcher: Option<&dyn SourceRefetcher>,
    ) -> Result<VerificationOutcome, LexError> {
        let mut current_sources = sources;
        let mut attempt = 0;

        loop {
            let mut outcome = self.verify(answer, &current_sources).await?;
            outcome.retries = attempt;

            if !self.auto_retry_enabled
                || !self
                    .engine
                    .should_retry(outcome.confidence, self.retry_threshold)
                || attempt >= self.max_retries
            {
                return Ok(outcome);
            }
            let Some(refetcher) = refetcher else {
                return Ok(outcome);
            };

            tracing::info!(
                attempt = attempt + 1,
                confidence = outcome.confidence,
                threshold = self.retry_threshold,
                "confidence below retry threshold, refetching sources"
            );
            current_sources = refetcher.refetch(answer, outcome.confidence).await?;
            attempt += 1;
        }
    }

    fn rejected(
        &self,
        verification_id: Uuid,
        started: Instant,
        reason: RejectReason,
    ) -> VerificationOutcome {
        tracing::warn!(%verification_id, ?reason, "verification short-circuited");
        let report = self.engine.calculate(&VerificationSignals::default());
        VerificationOutcome {
            verification_id,
            confidence: 0.0,
            trust_label: TrustLabel::Rejected,
            verified: false,
            report,
            sentences: Vec::new(),
            citations: Vec::new(),
            source_hashes: Vec::new(),
            reject_reason: Some(reason),
            retries: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashedEmbedder;
    use crate::verify::citation::LegalCitationExtractor;
    use crate::verify::sentence::GermanLegalSplitter;
    use parking_lot::Mutex;

    fn verifier(auto_retry: bool) -> Verifier {
        let settings = Settings {
            auto_retry_enabled: auto_retry,
            auto_retry_threshold: 0.90,
            max_retries: 2,
            ..Settings::default()
        };
        Verifier::new(
            SentenceProcessor::new(
                Arc::new(GermanLegalSplitter::new()),
                Arc::new(LegalCitationExtractor::new()),
            ),
            SemanticMatcher::new(Arc::new(HashedEmbedder::default()), 100),
            ConfidenceEngine::new(settings.sentence_threshold, settings.overall_threshold),
            Arc::new(FingerprintTracker::new()),
            &settings,
        )
    }

    fn snippet(id: &str, text: &str, score: f32) -> SourceSnippet {
        SourceSnippet {
            source_id: id.into(),
            text: text.into(),
            score: Some(score),
        }
    }

    #[tokio::test]
    async fn grounded_answer_records_fingerprints() {
        let v = verifier(false);
        let answer = "Nach § 823 haftet der Schädiger für den entstandenen Schaden.";
        let sources = vec![snippet(
            "§ 823",
            "Nach § 823 haftet der Schädiger für den entstandenen Schaden.",
            0.95,
        )];

        let outcome = v.verify(answer, &sources).await.unwrap();
        assert!(outcome.reject_reason.is_none());
        assert_eq!(outcome.source_hashes.len(), 1);
        assert_eq!(outcome.citations, ["§ 823"]);
        assert!(outcome.sentences[0].verified);

        let record = v.tracker().record(outcome.verification_id).unwrap();
        assert!(record.is_valid);
        assert_eq!(record.source_hashes, outcome.source_hashes);
    }

    #[tokio::test]
    async fn empty_answer_is_rejected_with_reason() {
        let v = verifier(false);
        let outcome = v
            .verify("", &[snippet("s", "Quelle", 0.9)])
            .await
            .unwrap();
        assert_eq!(outcome.reject_reason, Some(RejectReason::NoSentences));
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.trust_label, TrustLabel::Rejected);
    }

    #[tokio::test]
    async fn missing_sources_reject_without_model_calls() {
        let v = verifier(false);
        let outcome = v.verify("Ein ganz normaler Satz.", &[]).await.unwrap();
        assert_eq!(outcome.reject_reason, Some(RejectReason::NoSources));
        assert_eq!(outcome.trust_label, TrustLabel::Rejected);
    }

    struct CountingRefetcher {
        calls: Mutex<u32>,
        better: Vec<SourceSnippet>,
    }

    #[async_trait]
    impl SourceRefetcher for CountingRefetcher {
        async fn refetch(
            &self,
            _answer: &str,
            _confidence: f32,
        ) -> Result<Vec<SourceSnippet>, LexError> {
            *self.calls.lock() += 1;
            Ok(self.better.clone())
        }
    }

    #[tokio::test]
    async fn retry_swaps_in_refetched_sources() {
        let v = verifier(true);
        let answer = "Der Verkäufer muss die Sache übergeben und das Eigentum verschaffen.";
        let weak = vec![snippet("weit-weg", "Völlig anderes Thema hier.", 0.4)];
        let refetcher = CountingRefetcher {
            calls: Mutex::new(0),
            better: vec![snippet(
                "§ 433",
                "Der Verkäufer muss die Sache übergeben und das Eigentum verschaffen.",
                0.95,
            )],
        };

        let outcome = v
            .verify_with_retry(answer, weak, Some(&refetcher))
            .await
            .unwrap();
        assert!(*refetcher.calls.lock() >= 1);
        assert!(outcome.retries >= 1);
        assert!(outcome.confidence > 0.60);
    }

    #[tokio::test]
    async fn retry_disabled_runs_exactly_once() {
        let v = verifier(false);
        let refetcher = CountingRefetcher {
            calls: Mutex::new(0),
            better: vec![],
        };
        let outcome = v
            .verify_with_retry(
                "Ein unbelegter Satz steht hier.",
                vec![snippet("s", "etwas anderes", 0.4)],
                Some(&refetcher),
            )
            .await
            .unwrap();
        assert_eq!(*refetcher.calls.lock(), 0);
        assert_eq!(outcome.retries, 0);
    }

    #[tokio::test]
    async fn unsupported_sentences_are_surfaced() {
        let v = verifier(false);
        let answer = "Der Himmel ist grün und Ampeln singen. Der Schuldner hat Vorsatz zu vertreten.";
        let sources = vec![snippet(
            "§ 276",
            "Der Schuldner hat Vorsatz und Fahrlässigkeit zu vertreten.",
            0.9,
        )];
        let outcome = v.verify(answer, &sources).await.unwrap();
        let unsupported = outcome.unsupported_sentences();
        assert!(unsupported.iter().any(|s| s.contains("Himmel")));
        assert!(!unsupported.iter().any(|s| s.contains("Schuldner")));
    }
}
