//! Error kinds shared across the core pipeline.
//!
//! The core returns structured errors; the HTTP boundary owns the mapping to
//! status codes and safe messages. Sensitive detail (PII, stack traces) never
//! appears in a rendered error.

use thiserror::Error;

/// Unified error for the core retrieval, anonymization, and verification
/// pipeline.
///
/// Variants follow the kinds a caller needs to distinguish: validation
/// failures are never retried, external failures may be, cache failures are
/// swallowed by the component that hits them.
#[derive(Debug, Error)]
pub enum LexError {
    /// Malformed input (bad UUID, empty query, oversize file, disallowed
    /// extension). Surfaced as 4xx.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown document or verification id. Surfaced as 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate of an existing resource (same document hash for the same
    /// user). Surfaced as 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the configured size limit. Surfaced as 413.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// A collaborator service is down or timed out after bounded retries.
    /// Surfaced as 5xx.
    #[error("{service} unavailable: {reason}")]
    ExternalUnavailable {
        service: &'static str,
        reason: String,
    },

    /// Quota or rate limit exceeded. Surfaced as 429 and retryable by the
    /// caller.
    #[error("quota or rate limit exceeded: {0}")]
    QuotaOrRate(String),

    /// The leakage check found PII in text bound for the generative model.
    /// Fatal for the request; the model call must not happen.
    #[error("PII leakage detected in anonymized {context}")]
    PiiLeakage { context: &'static str },

    /// Cache read/write failure. Components log this and proceed; it must
    /// never surface to a caller.
    #[error("cache error: {0}")]
    Cache(String),

    /// Anything that indicates a bug rather than bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LexError {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a not-found failure.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shorthand for an external-service failure.
    pub fn external(service: &'static str, reason: impl Into<String>) -> Self {
        Self::ExternalUnavailable {
            service,
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalUnavailable { .. } | Self::QuotaOrRate(_) | Self::Cache(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LexError::external("vector-store", "timeout").is_retryable());
        assert!(LexError::QuotaOrRate("monthly tokens".into()).is_retryable());
        assert!(!LexError::validation("empty query").is_retryable());
        assert!(!LexError::PiiLeakage { context: "query" }.is_retryable());
    }

    #[test]
    fn display_carries_no_payload_detail() {
        let err = LexError::PayloadTooLarge {
            size: 20_000_000,
            limit: 10_000_000,
        };
        assert!(err.to_string().contains("payload too large"));
    }
}
