//! Collaborator contracts the core consumes.
//!
//! Every external system the pipeline talks to is behind one of these
//! traits: constructors take trait objects, tests inject stubs, and nothing
//! in the core knows a concrete backend. All I/O-shaped methods are async
//! and cancellable by dropping the future.
//!
//! ```text
//!                 ┌────────────── core pipeline ──────────────┐
//!   Embedder ────►│ Retriever   PiiAnonymizer   Verifier      │
//!   VectorStore ─►│ IndexerService        AnalyzeService      │
//!   KvStore ─────►│                                           │
//!   LlmClient ───►│                                           │
//!   OcrClient ───►│ (indexer only)                            │
//!   PiiDetector ─►│ (anonymizer only)                         │
//!                 └───────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::LexError;
use crate::types::{Chunk, Document, DocumentStatus, QueryLogEntry};

// ── Embedder ───────────────────────────────────────────────────────────

/// Text-to-vector encoder. The only contract is the dimension: every vector
/// returned has exactly `dim()` components, and `embed_batch` preserves
/// input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LexError>;

    /// Embed a batch of texts, one vector per input, same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LexError>;
}

// ── VectorStore ────────────────────────────────────────────────────────

/// Distance function for the vector collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
}

/// One similarity hit returned by [`VectorStore::match_chunks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub chunk_id: String,
    pub section_id: String,
    pub content: String,
    pub similarity: f32,
}

/// Hierarchical context for one chunk, fetched in a single batched call.
#[derive(Debug, Clone, Default)]
pub struct ChunkContext {
    pub target: Option<Chunk>,
    pub parent: Option<Chunk>,
    pub siblings: Vec<Chunk>,
}

/// A chunk plus its vector and the numeric id the backend stores it under.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub numeric_id: u64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Vector index over chunk embeddings.
///
/// `match_chunks` returns hits ordered by similarity descending.
/// `batch_context` is ONE backend call for the whole id list; looping over
/// ids with per-chunk lookups is a contract violation.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create (or recreate) the collection with the given dimension.
    async fn create_collection(
        &self,
        dim: usize,
        metric: DistanceMetric,
        recreate: bool,
    ) -> Result<(), LexError>;

    /// Insert or replace points by numeric id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), LexError>;

    /// Similarity search scoped to one document, descending by similarity.
    async fn match_chunks(
        &self,
        vector: &[f32],
        doc_id: &str,
        min_similarity: f32,
        k: usize,
    ) -> Result<Vec<VectorMatch>, LexError>;

    /// Fetch target/parent/sibling context for every id in one call.
    /// Ids the backend does not know are simply absent from the map.
    async fn batch_context(
        &self,
        chunk_ids: &[String],
    ) -> Result<FxHashMap<String, ChunkContext>, LexError>;

    /// Remove every chunk of a document. Returns the number removed.
    async fn delete_by_doc(&self, doc_id: &str) -> Result<usize, LexError>;
}

// ── KvStore ────────────────────────────────────────────────────────────

/// Connection-pool counters surfaced for monitoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub max_connections: u32,
    pub in_use_connections: u32,
    pub available_connections: u32,
}

/// Ephemeral key-value store with TTLs (Redis-shaped).
///
/// Used for the query-result cache and the short-lived PII mappings. Cache
/// consumers must treat every error here as a miss; PII consumers must treat
/// write failures as fatal.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` to `value` with expiry `ttl`.
    async fn setex(&self, key: &str, ttl: Duration, value: Vec<u8>) -> Result<(), LexError>;

    /// Fetch a key; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LexError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), LexError>;

    /// Keys matching a glob pattern (`*` wildcard only).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, LexError>;

    /// Delete many keys, returning how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, LexError>;

    /// Pool counters for the metrics endpoint.
    fn pool_stats(&self) -> PoolStats;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> bool;
}

// ── LlmClient ──────────────────────────────────────────────────────────

/// Result of one generative-model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnswer {
    pub answer: String,
    pub tokens_used: u64,
    pub model_version: String,
}

/// The generative model. Receives only anonymized text; the leakage gate
/// upstream guarantees no PII crosses this boundary.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn analyze(
        &self,
        anon_query: &str,
        anon_context: &str,
        request_id: &str,
    ) -> Result<LlmAnswer, LexError>;
}

// ── OcrClient ──────────────────────────────────────────────────────────

/// Output of the remote OCR service for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrDocumentResult {
    pub text: String,
    pub page_count: usize,
    pub confidence: f32,
}

/// Black-box remote OCR service, consumed by the indexer for PDF uploads.
#[async_trait]
pub trait OcrClient: Send + Sync {
    fn is_available(&self) -> bool;

    async fn process(
        &self,
        pdf_bytes: &[u8],
        enable_handwriting: bool,
        request_id: &str,
    ) -> Result<OcrDocumentResult, LexError>;
}

// ── PiiDetector ────────────────────────────────────────────────────────

/// Category of a detected PII span. Placeholders are rendered as
/// `<LABEL_n>` where `LABEL` is [`PiiKind::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Person,
    Email,
    Phone,
    Address,
    Iban,
}

impl PiiKind {
    /// Placeholder stem for this kind.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Address => "ADDRESS",
            Self::Iban => "IBAN",
        }
    }
}

/// One detected PII occurrence. `start`/`end` are byte offsets into the
/// scanned text and spans never overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiSpan {
    pub start: usize,
    pub end: usize,
    pub kind: PiiKind,
    pub value: String,
}

/// Pluggable PII recognizer. How spans are recognized is the detector's
/// business; the anonymizer only relies on document order and
/// non-overlapping spans.
pub trait PiiDetector: Send + Sync {
    fn detect(&self, text: &str) -> Vec<PiiSpan>;
}

// ── DocumentStore ──────────────────────────────────────────────────────

/// Registry of uploaded documents and their lifecycle status.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: Document) -> Result<(), LexError>;

    async fn get(&self, doc_id: Uuid) -> Result<Option<Document>, LexError>;

    /// Duplicate check: the same content hash for the same user.
    async fn find_by_hash(
        &self,
        user_id: &str,
        doc_hash: &str,
    ) -> Result<Option<Document>, LexError>;

    async fn set_status(&self, doc_id: Uuid, status: DocumentStatus) -> Result<(), LexError>;
}

// ── QueryLog ───────────────────────────────────────────────────────────

/// Append-only, PII-free audit trail of analyze requests.
#[async_trait]
pub trait QueryLog: Send + Sync {
    async fn append(&self, entry: QueryLogEntry) -> Result<(), LexError>;

    /// Most recent entries for a document, newest first.
    async fn for_document(
        &self,
        doc_id: Uuid,
        limit: usize,
    ) -> Result<Vec<QueryLogEntry>, LexError>;
}
