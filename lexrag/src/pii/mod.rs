//! PII anonymization pipeline.
//!
//! Text crossing the model boundary carries no PII: spans are replaced by
//! `<KIND_n>` placeholders, the mapping lives in the KV store under a
//! short TTL, and the answer is de-anonymized on the way out. The mapping
//! key is deleted right after a successful de-anonymization.

pub mod detector;

use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::LexError;
use crate::ports::{KvStore, PiiDetector, PiiKind};

pub use detector::RegexPiiDetector;

/// KV key for a request's PII mapping.
#[must_use]
pub fn mapping_key(request_id: &str) -> String {
    format!("pii:{request_id}")
}

/// Replaces detected PII with placeholders and restores it later.
///
/// `anonymize` is pure with respect to the input text: identical inputs
/// produce identical anonymized outputs and equivalent mappings.
#[derive(Clone)]
pub struct PiiAnonymizer {
    detector: Arc<dyn PiiDetector>,
    kv: Arc<dyn KvStore>,
    mapping_ttl: Duration,
}

impl PiiAnonymizer {
    #[must_use]
    pub fn new(detector: Arc<dyn PiiDetector>, kv: Arc<dyn KvStore>, mapping_ttl: Duration) -> Self {
        Self {
            detector,
            kv,
            mapping_ttl,
        }
    }

    /// Replace every detected span with a stable placeholder and persist
    /// the `placeholder → value` mapping under `pii:<requestId>`.
    ///
    /// Identical values within one request share a placeholder; ordinals
    /// are 1-based per kind in first-occurrence order. A KV write failure
    /// is fatal for the request.
    pub async fn anonymize(
        &self,
        text: &str,
        request_id: &str,
    ) -> Result<(String, HashMap<String, String>), LexError> {
        let mut spans = self.detector.detect(text);
        spans.sort_by_key(|s| s.start);

        let mut anonymized = String::with_capacity(text.len());
        let mut mapping: HashMap<String, String> = HashMap::new();
        let mut assigned: FxHashMap<(PiiKind, String), String> = FxHashMap::default();
        let mut ordinals: FxHashMap<PiiKind, usize> = FxHashMap::default();
        let mut cursor = 0;

        for span in spans {
            if span.start < cursor {
                // Defensive against a detector violating the no-overlap
                // contract; keep the earlier replacement.
                continue;
            }
            anonymized.push_str(&text[cursor..span.start]);

            let placeholder = assigned
                .entry((span.kind, span.value.clone()))
                .or_insert_with(|| {
                    let ordinal = ordinals.entry(span.kind).or_insert(0);
                    *ordinal += 1;
                    format!("<{}_{}>", span.kind.label(), ordinal)
                })
                .clone();

            mapping.insert(placeholder.clone(), span.value.clone());
            anonymized.push_str(&placeholder);
            cursor = span.end;
        }
        anonymized.push_str(&text[cursor..]);

        if !mapping.is_empty() {
            let payload = serde_json::to_vec(&mapping)
                .map_err(|err| LexError::Internal(format!("PII mapping serialization: {err}")))?;
            self.kv
                .setex(&mapping_key(request_id), self.mapping_ttl, payload)
                .await
                .map_err(|err| {
                    LexError::external("kv-store", format!("storing PII mapping failed: {err}"))
                })?;
        }

        metrics::counter!("lexrag_pii_entities_anonymized_total").increment(mapping.len() as u64);
        Ok((anonymized, mapping))
    }

    /// Restore PII into `text` from the stored mapping, then delete the
    /// mapping key. Missing placeholders are tolerated silently; a missing
    /// mapping returns the text unchanged.
    pub async fn deanonymize(&self, text: &str, request_id: &str) -> Result<String, LexError> {
        let key = mapping_key(request_id);
        let Some(bytes) = self.kv.get(&key).await? else {
            tracing::warn!(request_id, "no PII mapping found, returning text unchanged");
            return Ok(text.to_string());
        };
        let mapping: HashMap<String, String> = serde_json::from_slice(&bytes)
            .map_err(|err| LexError::Internal(format!("PII mapping unreadable: {err}")))?;

        let mut restored = text.to_string();
        for (placeholder, value) in &mapping {
            restored = restored.replace(placeholder, value);
        }

        self.kv.del(&key).await?;
        Ok(restored)
    }

    /// Drop a stored mapping without de-anonymizing (context mappings that
    /// never flow back to the user).
    pub async fn discard_mapping(&self, request_id: &str) -> Result<(), LexError> {
        self.kv.del(&mapping_key(request_id)).await
    }

    /// True iff the detector finds nothing in the anonymized text. A false
    /// return must abort the request before any model call.
    #[must_use]
    pub fn verify_no_leakage(&self, anonymized_text: &str) -> bool {
        let residual = self.detector.detect(anonymized_text);
        if residual.is_empty() {
            true
        } else {
            tracing::error!(
                spans = residual.len(),
                "PII detected in text that was supposed to be anonymized"
            );
            false
        }
    }
}
