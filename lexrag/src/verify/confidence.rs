//! Multi-signal confidence scoring.
//!
//! Four components fuse into one score: semantic similarity (with variance
//! and low-score penalties), retrieval quality, citation presence, and
//! sentence coverage. The weighted sum is clamped to [0, 1] and mapped to a
//! trust label.

use serde::{Deserialize, Serialize};

use crate::errors::LexError;

/// Trust classification derived from the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLabel {
    Verified,
    Review,
    Rejected,
}

impl std::fmt::Display for TrustLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::Review => write!(f, "review"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Confidence below which an answer is `Rejected` rather than `Review`.
const REVIEW_THRESHOLD: f32 = 0.60;

/// Weights of the four components. Must sum to 1 within ±0.01.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub semantic_similarity: f32,
    pub retrieval_quality: f32,
    pub citation_presence: f32,
    pub coverage: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            semantic_similarity: 0.60,
            retrieval_quality: 0.25,
            citation_presence: 0.10,
            coverage: 0.05,
        }
    }
}

impl Weights {
    fn sum(&self) -> f32 {
        self.semantic_similarity + self.retrieval_quality + self.citation_presence + self.coverage
    }
}

/// Raw signals collected during verification.
#[derive(Debug, Clone, Default)]
pub struct VerificationSignals {
    /// Best similarity per answer sentence.
    pub sentence_scores: Vec<f32>,
    /// Retrieval similarities of the sources.
    pub retrieval_scores: Vec<f32>,
    pub citation_count: usize,
    pub source_count: usize,
}

/// Per-component breakdown of a confidence score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentScores {
    pub semantic_similarity: f32,
    pub retrieval_quality: f32,
    pub citation_presence: f32,
    pub coverage: f32,
}

/// Result of one confidence computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub confidence: f32,
    pub verified: bool,
    pub trust_label: TrustLabel,
    pub components: ComponentScores,
    pub verified_sentences: usize,
    pub total_sentences: usize,
}

/// Fuses verification signals into a confidence score and trust label.
#[derive(Debug, Clone)]
pub struct ConfidenceEngine {
    sentence_threshold: f32,
    overall_threshold: f32,
    weights: Weights,
}

impl ConfidenceEngine {
    /// Build an engine with the default weights.
    #[must_use]
    pub fn new(sentence_threshold: f32, overall_threshold: f32) -> Self {
        Self {
            sentence_threshold,
            overall_threshold,
            weights: Weights::default(),
        }
    }

    /// Build an engine with custom weights.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the weights do not sum to 1 ± 0.01.
    pub fn with_weights(
        sentence_threshold: f32,
        overall_threshold: f32,
        weights: Weights,
    ) -> Result<Self, LexError> {
        let sum = weights.sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(LexError::Validation(format!(
                "confidence weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(Self {
            sentence_threshold,
            overall_threshold,
            weights,
        })
    }

    #[must_use]
    pub fn sentence_threshold(&self) -> f32 {
        self.sentence_threshold
    }

    #[must_use]
    pub fn overall_threshold(&self) -> f32 {
        self.overall_threshold
    }

    /// Average sentence similarity, penalized for variance (sample
    /// variance, capped at 0.15) and for the fraction of sentences under
    /// the sentence threshold (0.20 at worst). Never below zero.
    #[must_use]
    pub fn semantic_score(&self, sentence_scores: &[f32]) -> f32 {
        if sentence_scores.is_empty() {
            return 0.0;
        }
        let n = sentence_scores.len() as f32;
        let mean = sentence_scores.iter().sum::<f32>() / n;

        let mut score = mean;
        if sentence_scores.len() > 1 {
            let variance = sentence_scores
                .iter()
                .map(|s| (s - mean).powi(2))
                .sum::<f32>()
                / (n - 1.0);
            score -= (0.5 * variance).min(0.15);
        }

        let low_ratio = sentence_scores
            .iter()
            .filter(|s| **s < self.sentence_threshold)
            .count() as f32
            / n;
        score -= 0.20 * low_ratio;

        score.max(0.0)
    }

    /// Average of the top-3 retrieval similarities; 0.5 when there are no
    /// retrieval scores at all.
    #[must_use]
    pub fn retrieval_score(&self, retrieval_scores: &[f32]) -> f32 {
        if retrieval_scores.is_empty() {
            return 0.5;
        }
        let mut sorted = retrieval_scores.to_vec();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let top = &sorted[..sorted.len().min(3)];
        top.iter().sum::<f32>() / top.len() as f32
    }

    /// Citation presence with diminishing returns.
    #[must_use]
    pub fn citation_score(&self, citation_count: usize) -> f32 {
        match citation_count {
            0 => 0.3,
            1 => 0.7,
            2 => 0.85,
            n => (0.85 + (n - 2) as f32 * 0.05).min(1.0),
        }
    }

    /// Fraction of verified sentences.
    #[must_use]
    pub fn coverage_score(&self, verified: usize, total: usize) -> f32 {
        if total == 0 {
            0.0
        } else {
            verified as f32 / total as f32
        }
    }

    /// Weighted fusion of all components, clamped to [0, 1].
    #[must_use]
    pub fn calculate(&self, signals: &VerificationSignals) -> ConfidenceReport {
        let semantic = self.semantic_score(&signals.sentence_scores);
        let retrieval = self.retrieval_score(&signals.retrieval_scores);
        let citations = self.citation_score(signals.citation_count);

        let verified_sentences = signals
            .sentence_scores
            .iter()
            .filter(|s| **s >= self.sentence_threshold)
            .count();
        let total_sentences = signals.sentence_scores.len();
        let coverage = self.coverage_score(verified_sentences, total_sentences);

        let confidence = (semantic * self.weights.semantic_similarity
            + retrieval * self.weights.retrieval_quality
            + citations * self.weights.citation_presence
            + coverage * self.weights.coverage)
            .clamp(0.0, 1.0);

        ConfidenceReport {
            confidence,
            verified: confidence >= self.overall_threshold,
            trust_label: self.trust_label(confidence),
            components: ComponentScores {
                semantic_similarity: semantic,
                retrieval_quality: retrieval,
                citation_presence: citations,
                coverage,
            },
            verified_sentences,
            total_sentences,
        }
    }

    /// Threshold mapping: `Verified` at the overall threshold, `Review`
    /// from 0.60, `Rejected` below.
    #[must_use]
    pub fn trust_label(&self, confidence: f32) -> TrustLabel {
        if confidence >= self.overall_threshold {
            TrustLabel::Verified
        } else if confidence >= REVIEW_THRESHOLD {
            TrustLabel::Review
        } else {
            TrustLabel::Rejected
        }
    }

    /// Whether a verification round should be retried with better sources.
    #[must_use]
    pub fn should_retry(&self, confidence: f32, retry_threshold: f32) -> bool {
        confidence < retry_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ConfidenceEngine {
        ConfidenceEngine::new(0.75, 0.80)
    }

    #[test]
    fn well_supported_answer_is_verified() {
        let report = engine().calculate(&VerificationSignals {
            sentence_scores: vec![0.92, 0.88, 0.85],
            retrieval_scores: vec![0.95, 0.89, 0.82],
            citation_count: 2,
            source_count: 3,
        });
        assert!(report.confidence > 0.80, "confidence {}", report.confidence);
        assert!(report.verified);
        assert_eq!(report.trust_label, TrustLabel::Verified);
        assert_eq!(report.verified_sentences, 3);
    }

    #[test]
    fn hallucinated_answer_is_rejected() {
        let report = engine().calculate(&VerificationSignals {
            sentence_scores: vec![0.55, 0.48, 0.62],
            retrieval_scores: vec![0.60],
            citation_count: 0,
            source_count: 1,
        });
        assert!(report.confidence < 0.60, "confidence {}", report.confidence);
        assert_eq!(report.trust_label, TrustLabel::Rejected);
        assert_eq!(report.verified_sentences, 0);
    }

    #[test]
    fn mixed_answer_lands_in_review() {
        let report = engine().calculate(&VerificationSignals {
            sentence_scores: vec![0.82, 0.68, 0.75],
            retrieval_scores: vec![0.78, 0.65],
            citation_count: 1,
            source_count: 2,
        });
        assert_eq!(report.trust_label, TrustLabel::Review);
    }

    #[test]
    fn confidence_is_always_in_unit_interval() {
        let cases = [
            VerificationSignals::default(),
            VerificationSignals {
                sentence_scores: vec![1.0; 10],
                retrieval_scores: vec![1.0; 10],
                citation_count: 50,
                source_count: 10,
            },
            VerificationSignals {
                sentence_scores: vec![0.0; 10],
                retrieval_scores: vec![],
                citation_count: 0,
                source_count: 0,
            },
        ];
        for signals in cases {
            let report = engine().calculate(&signals);
            assert!((0.0..=1.0).contains(&report.confidence));
            assert_eq!(report.verified, report.confidence >= 0.80);
        }
    }

    #[test]
    fn citation_scores_have_diminishing_returns() {
        let e = engine();
        assert!((e.citation_score(0) - 0.3).abs() < f32::EPSILON);
        assert!((e.citation_score(1) - 0.7).abs() < f32::EPSILON);
        assert!((e.citation_score(2) - 0.85).abs() < f32::EPSILON);
        assert!((e.citation_score(3) - 0.90).abs() < 1e-6);
        assert!((e.citation_score(10) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn retrieval_uses_top_three_only() {
        let e = engine();
        assert!((e.retrieval_score(&[]) - 0.5).abs() < f32::EPSILON);
        assert!((e.retrieval_score(&[0.8]) - 0.8).abs() < 1e-6);
        let top3 = e.retrieval_score(&[0.9, 0.8, 0.7, 0.1, 0.1]);
        assert!((top3 - 0.8).abs() < 1e-6);
    }

    #[test]
    fn variance_penalty_is_capped() {
        let e = engine();
        let uniform = e.semantic_score(&[0.8, 0.8, 0.8]);
        let spread = e.semantic_score(&[0.99, 0.8, 0.61]);
        assert!(spread < uniform);
        // Even absurd spreads cost at most 0.15 from the variance term.
        let wild = e.semantic_score(&[1.0, 0.0]);
        assert!(wild >= 0.5 - 0.15 - 0.20 - 1e-6);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let bad = Weights {
            semantic_similarity: 0.9,
            retrieval_quality: 0.9,
            citation_presence: 0.0,
            coverage: 0.0,
        };
        assert!(ConfidenceEngine::with_weights(0.75, 0.80, bad).is_err());
        assert!(ConfidenceEngine::with_weights(0.75, 0.80, Weights::default()).is_ok());
    }

    #[test]
    fn label_thresholds_are_strict() {
        let e = engine();
        assert_eq!(e.trust_label(0.80), TrustLabel::Verified);
        assert_eq!(e.trust_label(0.799), TrustLabel::Review);
        assert_eq!(e.trust_label(0.60), TrustLabel::Review);
        assert_eq!(e.trust_label(0.599), TrustLabel::Rejected);
    }
}
