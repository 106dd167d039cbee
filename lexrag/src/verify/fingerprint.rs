//! Source fingerprinting and verification invalidation.
//!
//! Every verification records SHA-256 hashes of its sources and of the
//! answer. When a source text changes, every verification that referenced
//! the superseded hash flips to invalid; an index from source hash to
//! verification ids keeps that O(affected records). The index is updated
//! under the same lock as the records, so readers never observe one without
//! the other.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::sha256_hex;

use super::confidence::TrustLabel;

/// Display prefix length for hashes in logs and summaries.
const HASH_DISPLAY_CHARS: usize = 16;

/// Fingerprint of one source snippet at verification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub source_id: String,
    pub text: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Audit record of one verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verification_id: Uuid,
    pub answer_hash: String,
    pub source_hashes: Vec<String>,
    pub confidence: f32,
    pub trust_label: TrustLabel,
    pub created_at: DateTime<Utc>,
    pub is_valid: bool,
}

/// Outcome of a source update.
#[derive(Debug, Clone)]
pub struct SourceUpdate {
    pub changed: bool,
    pub old_hash: Option<String>,
    pub new_hash: String,
    pub invalidated: Vec<Uuid>,
}

/// Tracker statistics for monitoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_fingerprints: usize,
    pub unique_sources: usize,
    pub total_verifications: usize,
    pub valid_verifications: usize,
    pub invalid_verifications: usize,
}

#[derive(Default)]
struct TrackerInner {
    /// hash → fingerprint. The same text from two sources shares a hash but
    /// the latest fingerprint wins; change detection only needs the hash.
    fingerprints: FxHashMap<String, SourceFingerprint>,
    /// source_id → hash of its latest known text.
    latest_by_source: FxHashMap<String, String>,
    records: FxHashMap<Uuid, VerificationRecord>,
    /// source hash → ids of verifications that referenced it.
    by_source_hash: FxHashMap<String, FxHashSet<Uuid>>,
}

/// Records fingerprints and verifications; invalidates on source change.
#[derive(Default)]
pub struct FingerprintTracker {
    inner: RwLock<TrackerInner>,
}

impl FingerprintTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-256 hex digest of a text.
    #[must_use]
    pub fn compute_hash(text: &str) -> String {
        sha256_hex(text.as_bytes())
    }

    /// Short display form of a hash.
    #[must_use]
    pub fn truncate_hash(hash: &str) -> &str {
        &hash[..hash.len().min(HASH_DISPLAY_CHARS)]
    }

    /// Fingerprint one source and remember it as the source's latest text.
    pub fn fingerprint(
        &self,
        source_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> SourceFingerprint {
        let fingerprint = SourceFingerprint {
            source_id: source_id.to_string(),
            text: text.to_string(),
            hash: Self::compute_hash(text),
            created_at: Utc::now(),
            metadata,
        };
        let mut inner = self.inner.write();
        inner
            .latest_by_source
            .insert(source_id.to_string(), fingerprint.hash.clone());
        inner
            .fingerprints
            .insert(fingerprint.hash.clone(), fingerprint.clone());
        fingerprint
    }

    /// Fingerprint a batch of `(source_id, text)` pairs.
    pub fn fingerprint_sources(&self, sources: &[(String, String)]) -> Vec<SourceFingerprint> {
        sources
            .iter()
            .map(|(id, text)| self.fingerprint(id, text, serde_json::Value::Null))
            .collect()
    }

    /// Record one verification and index it by every source hash.
    pub fn record_verification(
        &self,
        verification_id: Uuid,
        answer: &str,
        fingerprints: &[SourceFingerprint],
        confidence: f32,
        trust_label: TrustLabel,
    ) -> VerificationRecord {
        let record = VerificationRecord {
            verification_id,
            answer_hash: Self::compute_hash(answer),
            source_hashes: fingerprints.iter().map(|f| f.hash.clone()).collect(),
            confidence,
            trust_label,
            created_at: Utc::now(),
            is_valid: true,
        };

        let mut inner = self.inner.write();
        for hash in &record.source_hashes {
            inner
                .by_source_hash
                .entry(hash.clone())
                .or_default()
                .insert(verification_id);
        }
        inner.records.insert(verification_id, record.clone());
        record
    }

    /// Register new text for a source. When the hash changes, every
    /// verification referencing the old hash flips invalid; verifications
    /// referencing only other hashes are untouched.
    pub fn update_source(&self, source_id: &str, new_text: &str) -> SourceUpdate {
        let new_hash = Self::compute_hash(new_text);
        let mut inner = self.inner.write();

        let old_hash = inner.latest_by_source.get(source_id).cloned();
        let superseded = old_hash.clone().filter(|old| *old != new_hash);
        let changed = superseded.is_some();

        let mut invalidated = Vec::new();
        if let Some(old) = superseded {
            let affected: Vec<Uuid> = inner
                .by_source_hash
                .get(&old)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            for id in affected {
                if let Some(record) = inner.records.get_mut(&id)
                    && record.is_valid
                {
                    record.is_valid = false;
                    invalidated.push(id);
                }
            }
            tracing::info!(
                source_id,
                old_hash = Self::truncate_hash(&old),
                new_hash = Self::truncate_hash(&new_hash),
                invalidated = invalidated.len(),
                "source superseded"
            );
        }

        let fingerprint = SourceFingerprint {
            source_id: source_id.to_string(),
            text: new_text.to_string(),
            hash: new_hash.clone(),
            created_at: Utc::now(),
            metadata: serde_json::Value::Null,
        };
        inner
            .latest_by_source
            .insert(source_id.to_string(), new_hash.clone());
        inner.fingerprints.insert(new_hash.clone(), fingerprint);

        SourceUpdate {
            changed,
            old_hash,
            new_hash,
            invalidated,
        }
    }

    /// A verification record by id.
    #[must_use]
    pub fn record(&self, verification_id: Uuid) -> Option<VerificationRecord> {
        self.inner.read().records.get(&verification_id).cloned()
    }

    /// Every verification that ever referenced a source, newest first.
    #[must_use]
    pub fn audit_trail(&self, source_id: &str) -> Vec<VerificationRecord> {
        let inner = self.inner.read();
        let hashes: Vec<&String> = inner
            .fingerprints
            .values()
            .filter(|f| f.source_id == source_id)
            .map(|f| &f.hash)
            .collect();

        let mut ids = FxHashSet::default();
        for hash in hashes {
            if let Some(verifications) = inner.by_source_hash.get(hash) {
                ids.extend(verifications.iter().copied());
            }
        }

        let mut records: Vec<VerificationRecord> = ids
            .into_iter()
            .filter_map(|id| inner.records.get(&id).cloned())
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        records
    }

    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        let inner = self.inner.read();
        let valid = inner.records.values().filter(|r| r.is_valid).count();
        TrackerStats {
            total_fingerprints: inner.fingerprints.len(),
            unique_sources: inner.latest_by_source.len(),
            total_verifications: inner.records.len(),
            valid_verifications: valid,
            invalid_verifications: inner.records.len() - valid,
        }
    }
}
