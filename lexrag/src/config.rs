//! Runtime configuration for the core pipeline.
//!
//! [`Settings`] carries every tunable the pipeline recognizes, with compiled
//! defaults that match production. Values can be overridden programmatically
//! via the builder-style setters or loaded from `LEXRAG_*` environment
//! variables (a `.env` file is honored through `dotenvy`).

use std::time::Duration;

/// All knobs the core components read. Constructed once at startup and
/// shared by reference; components copy out the fields they need.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Upper bound on `Chunk.content` length in characters.
    pub max_chunk_size: usize,
    /// Characters overlapped between adjacent splits of a large section.
    pub chunk_overlap: usize,
    /// Retrieval breadth when the caller does not specify `top_k`.
    pub default_top_k: usize,
    /// Hard cap on caller-provided `top_k`.
    pub max_top_k: usize,
    /// Minimum similarity for a vector match to count.
    pub match_threshold: f32,
    /// KV TTL for PII mappings. Short by design.
    pub pii_mapping_ttl: Duration,
    /// Whether query-result caching is active.
    pub cache_enabled: bool,
    /// KV TTL for cached retrieval results.
    pub cache_query_results_ttl: Duration,
    /// Minimum per-sentence similarity for a sentence to count as verified.
    pub sentence_threshold: f32,
    /// Minimum confidence for the `Verified` trust label.
    pub overall_threshold: f32,
    /// Confidence below which the verifier re-runs with refetched sources.
    pub auto_retry_threshold: f32,
    /// Whether auto-retry is active at all.
    pub auto_retry_enabled: bool,
    /// Maximum verification retries.
    pub max_retries: u32,
    /// Capacity of the in-memory embedding cache owned by the matcher.
    pub embedding_cache_size: usize,
    /// Chunks per embed+upsert batch during bulk ingestion.
    pub embedding_batch_size: usize,
    /// Documents per chunking batch during bulk ingestion.
    pub chunk_batch_size: usize,
    /// Hard limit for one chunking batch.
    pub batch_timeout: Duration,
    /// Hard limit for chunking a single document.
    pub doc_timeout: Duration,
    /// Upper bound on uploaded file size in bytes.
    pub max_upload_bytes: u64,
    /// KV connection pool size (surfaced through `pool_stats`).
    pub kv_max_connections: u32,
    /// KV socket timeout.
    pub kv_socket_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_chunk_size: 1600,
            chunk_overlap: 100,
            default_top_k: 5,
            max_top_k: 20,
            match_threshold: 0.7,
            pii_mapping_ttl: Duration::from_secs(300),
            cache_enabled: true,
            cache_query_results_ttl: Duration::from_secs(3600),
            sentence_threshold: 0.75,
            overall_threshold: 0.80,
            auto_retry_threshold: 0.60,
            auto_retry_enabled: false,
            max_retries: 2,
            embedding_cache_size: 1000,
            embedding_batch_size: 1000,
            chunk_batch_size: 1000,
            batch_timeout: Duration::from_secs(1800),
            doc_timeout: Duration::from_secs(300),
            max_upload_bytes: 10 * 1024 * 1024,
            kv_max_connections: 10,
            kv_socket_timeout: Duration::from_secs(5),
        }
    }
}

macro_rules! env_override {
    ($settings:ident, $field:ident, $var:literal, usize) => {
        if let Ok(raw) = std::env::var($var)
            && let Ok(value) = raw.parse::<usize>()
        {
            $settings.$field = value;
        }
    };
    ($settings:ident, $field:ident, $var:literal, u32) => {
        if let Ok(raw) = std::env::var($var)
            && let Ok(value) = raw.parse::<u32>()
        {
            $settings.$field = value;
        }
    };
    ($settings:ident, $field:ident, $var:literal, u64) => {
        if let Ok(raw) = std::env::var($var)
            && let Ok(value) = raw.parse::<u64>()
        {
            $settings.$field = value;
        }
    };
    ($settings:ident, $field:ident, $var:literal, f32) => {
        if let Ok(raw) = std::env::var($var)
            && let Ok(value) = raw.parse::<f32>()
        {
            $settings.$field = value;
        }
    };
    ($settings:ident, $field:ident, $var:literal, bool) => {
        if let Ok(raw) = std::env::var($var)
            && let Ok(value) = raw.parse::<bool>()
        {
            $settings.$field = value;
        }
    };
    ($settings:ident, $field:ident, $var:literal, secs) => {
        if let Ok(raw) = std::env::var($var)
            && let Ok(value) = raw.parse::<u64>()
        {
            $settings.$field = Duration::from_secs(value);
        }
    };
}

impl Settings {
    /// Compiled defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by any `LEXRAG_*` environment variables present.
    /// Unparseable values are ignored in favor of the default.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut settings = Self::default();
        env_override!(settings, max_chunk_size, "LEXRAG_MAX_CHUNK_SIZE", usize);
        env_override!(settings, chunk_overlap, "LEXRAG_CHUNK_OVERLAP", usize);
        env_override!(settings, default_top_k, "LEXRAG_DEFAULT_TOP_K", usize);
        env_override!(settings, max_top_k, "LEXRAG_MAX_TOP_K", usize);
        env_override!(settings, match_threshold, "LEXRAG_MATCH_THRESHOLD", f32);
        env_override!(settings, pii_mapping_ttl, "LEXRAG_PII_MAPPING_TTL", secs);
        env_override!(settings, cache_enabled, "LEXRAG_CACHE_ENABLED", bool);
        env_override!(
            settings,
            cache_query_results_ttl,
            "LEXRAG_CACHE_QUERY_RESULTS_TTL",
            secs
        );
        env_override!(settings, sentence_threshold, "LEXRAG_SENTENCE_THRESHOLD", f32);
        env_override!(settings, overall_threshold, "LEXRAG_OVERALL_THRESHOLD", f32);
        env_override!(
            settings,
            auto_retry_threshold,
            "LEXRAG_AUTO_RETRY_THRESHOLD",
            f32
        );
        env_override!(settings, auto_retry_enabled, "LEXRAG_AUTO_RETRY_ENABLED", bool);
        env_override!(settings, max_retries, "LEXRAG_MAX_RETRIES", u32);
        env_override!(
            settings,
            embedding_cache_size,
            "LEXRAG_EMBEDDING_CACHE_SIZE",
            usize
        );
        env_override!(
            settings,
            embedding_batch_size,
            "LEXRAG_EMBEDDING_BATCH_SIZE",
            usize
        );
        env_override!(settings, chunk_batch_size, "LEXRAG_CHUNK_BATCH_SIZE", usize);
        env_override!(settings, batch_timeout, "LEXRAG_BATCH_TIMEOUT", secs);
        env_override!(settings, doc_timeout, "LEXRAG_DOC_TIMEOUT", secs);
        env_override!(settings, max_upload_bytes, "LEXRAG_MAX_UPLOAD_BYTES", u64);
        env_override!(settings, kv_max_connections, "LEXRAG_KV_MAX_CONNECTIONS", u32);
        env_override!(settings, kv_socket_timeout, "LEXRAG_KV_SOCKET_TIMEOUT", secs);
        settings
    }

    /// Set the maximum chunk size in characters.
    #[must_use]
    pub fn max_chunk_size(mut self, chars: usize) -> Self {
        self.max_chunk_size = chars;
        self
    }

    /// Set the overlap between adjacent split chunks.
    #[must_use]
    pub fn chunk_overlap(mut self, chars: usize) -> Self {
        self.chunk_overlap = chars;
        self
    }

    /// Set the default retrieval breadth.
    #[must_use]
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k;
        self
    }

    /// Enable or disable the query-result cache.
    #[must_use]
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the verifier thresholds in one call.
    #[must_use]
    pub fn thresholds(mut self, sentence: f32, overall: f32) -> Self {
        self.sentence_threshold = sentence;
        self.overall_threshold = overall;
        self
    }

    /// Clamp a caller-supplied `top_k` into `[1, max_top_k]`, falling back
    /// to the default when absent.
    #[must_use]
    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k)
    }
}
