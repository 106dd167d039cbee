//! Query-result cache over the KV store.
//!
//! Keys are a pure function of the retrieval inputs; no time-dependent
//! component enters the fingerprint. Every KV failure here degrades to a
//! miss: the cache can slow a query down, never fail it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::ports::KvStore;
use crate::types::{RetrievalResult, short_hash16};

/// Deterministic cache key over `(query, docId, topK, matchThreshold)`.
///
/// The embedding-model identity is deliberately not part of the key; a
/// model swap is expected to go through an explicit cache clear.
#[must_use]
pub fn query_cache_key(doc_id: &str, query: &str, top_k: usize, match_threshold: f32) -> String {
    format!(
        "query:{doc_id}:{}:{top_k}:{match_threshold}",
        short_hash16(query)
    )
}

/// Serialized cache payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResults {
    results: Vec<RetrievalResult>,
}

/// TTL-bound cache for retrieval results.
#[derive(Clone)]
pub struct QueryCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    enabled: bool,
}

impl QueryCache {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration, enabled: bool) -> Self {
        Self { kv, ttl, enabled }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Cached results for a key, or `None` on miss, expiry, deserialization
    /// failure, or any KV error.
    pub async fn get(&self, key: &str) -> Option<Vec<RetrievalResult>> {
        if !self.enabled {
            return None;
        }
        let bytes = match self.kv.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key, error = %err, "query cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice::<CachedResults>(&bytes) {
            Ok(cached) => Some(cached.results),
            Err(err) => {
                tracing::warn!(key, error = %err, "query cache entry unreadable, treating as miss");
                None
            }
        }
    }

    /// Store results under a key. Empty result lists are never stored.
    pub async fn put(&self, key: &str, results: &[RetrievalResult]) {
        if !self.enabled || results.is_empty() {
            return;
        }
        let payload = CachedResults {
            results: results.to_vec(),
        };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(key, error = %err, "query cache serialization failed");
                return;
            }
        };
        if let Err(err) = self.kv.setex(key, self.ttl, bytes).await {
            tracing::warn!(key, error = %err, "query cache write failed");
        }
    }

    /// Best-effort invalidation by glob pattern. Returns how many entries
    /// were dropped; readers tolerate stale hits bounded by the TTL.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let keys = match self.kv.keys(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(pattern, error = %err, "cache invalidation scan failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match self.kv.delete_many(&keys).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(pattern, error = %err, "cache invalidation delete failed");
                0
            }
        }
    }
}
