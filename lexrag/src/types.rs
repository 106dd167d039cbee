//! Shared record types flowing from parsing through retrieval to the audit
//! trail.
//!
//! These are plain owned structs with serde derives; they are created once by
//! their producing component and never mutated afterwards. A re-index
//! replaces a document's chunks wholesale rather than editing them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hierarchy class of a parsed section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Top-level marker (`§ 823`, `Artikel 3`).
    Section,
    /// `Absatz N` / `Abs. N`.
    Subsection,
    /// `Ziffer N`, `Nr. N`, `Nummer N`.
    Clause,
    /// `Buchstabe x`, `lit. x`, `(x)`.
    Paragraph,
}

/// One parser-identified unit of a legal document.
///
/// `position` is the document-order index; `parent_position` points at the
/// nearest earlier section with a strictly lower `level`, so
/// `parent_position < position` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: String,
    pub content: String,
    pub level: u8,
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_position: Option<usize>,
    pub chunk_type: ChunkType,
}

/// Per-chunk bookkeeping carried into the vector store payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub char_count: usize,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_split: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_section_id: Option<String>,
}

/// An embedding-ready slice of a section.
///
/// `chunk_id` is a stable hash of `(doc_id, section_id, split_index)` so a
/// re-run over identical input produces identical ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub section_id: String,
    pub content: String,
    pub chunk_type: ChunkType,
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Lifecycle flag for an uploaded document. Chunks of a deleted document are
/// not retrievable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Deleted,
}

/// An uploaded document. `doc_hash` (SHA-256 of the raw bytes) is unique per
/// user; a second upload of the same bytes is a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: Uuid,
    pub user_id: String,
    pub filename: String,
    pub doc_hash: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

/// One retrieval hit enriched with its hierarchical context.
///
/// Siblings never include the hit itself or its parent; the formatting layer
/// truncates them for the model context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub section_id: String,
    pub content: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_content: Option<String>,
    #[serde(default)]
    pub sibling_contents: Vec<String>,
}

/// PII-free audit record of one analyze request.
///
/// Only hashes of the query and answer are retained, never the texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub document_id: Uuid,
    pub query_hash: String,
    pub response_hash: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub citations_count: usize,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// Hex-encoded SHA-256 of a text, the change-detection primitive used for
/// document hashes, cache keys, and source fingerprints.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

/// First 16 hex chars of the SHA-256 of a text. Used where a short stable
/// key is enough (cache keys, embedding-cache keys).
#[must_use]
pub fn short_hash16(text: &str) -> String {
    let mut digest = sha256_hex(text.as_bytes());
    digest.truncate(16);
    digest
}
