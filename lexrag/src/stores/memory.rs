//! In-memory implementations of the storage ports.
//!
//! [`MemoryVectorStore`] does brute-force cosine search over its points;
//! [`MemoryKvStore`] honors TTLs lazily on read. Both are safe for
//! concurrent use via `parking_lot` locks and are deliberately boring:
//! their job is to make the pipeline runnable and testable without any
//! external service.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::embed::cosine_similarity;
use crate::errors::LexError;
use crate::ports::{
    ChunkContext, DistanceMetric, DocumentStore, KvStore, PoolStats, QueryLog, VectorMatch,
    VectorPoint, VectorStore,
};
use crate::types::{Chunk, Document, DocumentStatus, QueryLogEntry};

/// Glob match supporting `*` wildcards only (Redis `KEYS` subset).
fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(p: &[u8], k: &[u8]) -> bool {
        match (p.first(), k.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], k) || (!k.is_empty() && inner(p, &k[1..])),
            (Some(pc), Some(kc)) if pc == kc => inner(&p[1..], &k[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}

// ── MemoryVectorStore ──────────────────────────────────────────────────

#[derive(Default)]
struct VectorInner {
    dim: Option<usize>,
    points: FxHashMap<u64, VectorPoint>,
}

/// Brute-force in-memory vector index keyed by numeric point id.
#[derive(Default)]
pub struct MemoryVectorStore {
    inner: RwLock<VectorInner>,
}

impl MemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().points.len()
    }

    /// Whether the store holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chunks_of_doc(inner: &VectorInner, doc_id: &str) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = inner
            .points
            .values()
            .filter(|p| p.chunk.doc_id == doc_id)
            .map(|p| p.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.position);
        chunks
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(
        &self,
        dim: usize,
        _metric: DistanceMetric,
        recreate: bool,
    ) -> Result<(), LexError> {
        let mut inner = self.inner.write();
        if recreate {
            inner.points.clear();
        }
        inner.dim = Some(dim);
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), LexError> {
        let mut inner = self.inner.write();
        if let Some(dim) = inner.dim {
            if let Some(bad) = points.iter().find(|p| p.vector.len() != dim) {
                return Err(LexError::Validation(format!(
                    "vector for chunk {} has dimension {}, collection expects {dim}",
                    bad.chunk.chunk_id,
                    bad.vector.len()
                )));
            }
        }
        for point in points {
            inner.points.insert(point.numeric_id, point);
        }
        Ok(())
    }

    async fn match_chunks(
        &self,
        vector: &[f32],
        doc_id: &str,
        min_similarity: f32,
        k: usize,
    ) -> Result<Vec<VectorMatch>, LexError> {
        let inner = self.inner.read();
        let mut hits: Vec<VectorMatch> = inner
            .points
            .values()
            .filter(|p| p.chunk.doc_id == doc_id)
            .filter_map(|p| {
                let similarity = cosine_similarity(vector, &p.vector);
                (similarity >= min_similarity).then(|| VectorMatch {
                    chunk_id: p.chunk.chunk_id.clone(),
                    section_id: p.chunk.section_id.clone(),
                    content: p.chunk.content.clone(),
                    similarity,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    async fn batch_context(
        &self,
        chunk_ids: &[String],
    ) -> Result<FxHashMap<String, ChunkContext>, LexError> {
        let inner = self.inner.read();
        let mut contexts = FxHashMap::default();

        for chunk_id in chunk_ids {
            let Some(target) = inner
                .points
                .values()
                .map(|p| &p.chunk)
                .find(|c| &c.chunk_id == chunk_id)
            else {
                continue;
            };

            let doc_chunks = Self::chunks_of_doc(&inner, &target.doc_id);

            let parent = target.parent_id.as_ref().and_then(|pid| {
                doc_chunks
                    .iter()
                    .find(|c| &c.section_id == pid && c.chunk_id != target.chunk_id)
                    .cloned()
            });

            let siblings: Vec<Chunk> = doc_chunks
                .iter()
                .filter(|c| {
                    c.parent_id.is_some()
                        && c.parent_id == target.parent_id
                        && c.chunk_id != target.chunk_id
                        && parent.as_ref().is_none_or(|p| p.chunk_id != c.chunk_id)
                })
                .cloned()
                .collect();

            contexts.insert(
                chunk_id.clone(),
                ChunkContext {
                    target: Some(target.clone()),
                    parent,
                    siblings,
                },
            );
        }

        Ok(contexts)
    }

    async fn delete_by_doc(&self, doc_id: &str) -> Result<usize, LexError> {
        let mut inner = self.inner.write();
        let before = inner.points.len();
        inner.points.retain(|_, p| p.chunk.doc_id != doc_id);
        Ok(before - inner.points.len())
    }
}

// ── MemoryKvStore ──────────────────────────────────────────────────────

struct KvEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// TTL-aware in-memory key-value store. Expired entries are dropped lazily
/// on access.
pub struct MemoryKvStore {
    entries: RwLock<FxHashMap<String, KvEntry>>,
    max_connections: u32,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(10)
    }
}

impl MemoryKvStore {
    #[must_use]
    pub fn new(max_connections: u32) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            max_connections,
        }
    }

    /// Live (unexpired) key count.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn setex(&self, key: &str, ttl: Duration, value: Vec<u8>) -> Result<(), LexError> {
        self.entries.write().insert(
            key.to_string(),
            KvEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LexError> {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), LexError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, LexError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(key, entry)| entry.expires_at > now && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, LexError> {
        let mut entries = self.entries.write();
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            max_connections: self.max_connections,
            in_use_connections: 0,
            available_connections: self.max_connections,
        }
    }

    async fn ping(&self) -> bool {
        true
    }
}

// ── MemoryDocumentStore ────────────────────────────────────────────────

/// Document registry backed by a map.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<FxHashMap<Uuid, Document>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: Document) -> Result<(), LexError> {
        self.documents.write().insert(document.doc_id, document);
        Ok(())
    }

    async fn get(&self, doc_id: Uuid) -> Result<Option<Document>, LexError> {
        Ok(self.documents.read().get(&doc_id).cloned())
    }

    async fn find_by_hash(
        &self,
        user_id: &str,
        doc_hash: &str,
    ) -> Result<Option<Document>, LexError> {
        Ok(self
            .documents
            .read()
            .values()
            .find(|d| {
                d.user_id == user_id && d.doc_hash == doc_hash && d.status == DocumentStatus::Active
            })
            .cloned())
    }

    async fn set_status(&self, doc_id: Uuid, status: DocumentStatus) -> Result<(), LexError> {
        let mut documents = self.documents.write();
        let document = documents
            .get_mut(&doc_id)
            .ok_or_else(|| LexError::not_found(format!("document {doc_id}")))?;
        document.status = status;
        Ok(())
    }
}

// ── MemoryQueryLog ─────────────────────────────────────────────────────

/// Append-only in-memory audit trail.
#[derive(Default)]
pub struct MemoryQueryLog {
    entries: RwLock<Vec<QueryLogEntry>>,
}

impl MemoryQueryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryLog for MemoryQueryLog {
    async fn append(&self, entry: QueryLogEntry) -> Result<(), LexError> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn for_document(
        &self,
        doc_id: Uuid,
        limit: usize,
    ) -> Result<Vec<QueryLogEntry>, LexError> {
        let entries = self.entries.read();
        let mut matching: Vec<QueryLogEntry> = entries
            .iter()
            .filter(|e| e.document_id == doc_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, ChunkType};
    use chrono::Utc;

    fn chunk(doc: &str, section: &str, parent: Option<&str>, position: usize) -> Chunk {
        Chunk {
            chunk_id: format!("{doc}-{section}"),
            doc_id: doc.into(),
            section_id: section.into(),
            content: format!("content of {section}"),
            chunk_type: ChunkType::Section,
            position,
            parent_id: parent.map(Into::into),
            metadata: ChunkMetadata::default(),
            embedding: None,
        }
    }

    fn point(id: u64, chunk: Chunk, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            numeric_id: id,
            chunk,
            vector,
        }
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("query:*", "query:doc:abcd"));
        assert!(glob_match("pii:req1", "pii:req1"));
        assert!(glob_match("a*c", "abc"));
        assert!(glob_match("a*c", "ac"));
        assert!(!glob_match("query:*", "cache:query"));
        assert!(!glob_match("a*c", "abd"));
    }

    #[tokio::test]
    async fn match_filters_by_document_and_threshold() {
        let store = MemoryVectorStore::new();
        store
            .create_collection(2, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .upsert(vec![
                point(1, chunk("doc-a", "§ 1", None, 0), vec![1.0, 0.0]),
                point(2, chunk("doc-a", "§ 2", None, 1), vec![0.0, 1.0]),
                point(3, chunk("doc-b", "§ 1", None, 0), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .match_chunks(&[1.0, 0.0], "doc-a", 0.5, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].section_id, "§ 1");
    }

    #[tokio::test]
    async fn batch_context_excludes_self_and_parent_from_siblings() {
        let store = MemoryVectorStore::new();
        store
            .upsert(vec![
                point(1, chunk("d", "§ 5", None, 0), vec![1.0, 0.0]),
                point(2, chunk("d", "Abs. 1", Some("§ 5"), 1), vec![1.0, 0.0]),
                point(3, chunk("d", "Abs. 2", Some("§ 5"), 2), vec![1.0, 0.0]),
                point(4, chunk("d", "Abs. 3", Some("§ 5"), 3), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let contexts = store
            .batch_context(&["d-Abs. 2".to_string()])
            .await
            .unwrap();
        let ctx = contexts.get("d-Abs. 2").unwrap();
        assert_eq!(ctx.parent.as_ref().unwrap().section_id, "§ 5");
        let sibling_ids: Vec<&str> = ctx.siblings.iter().map(|c| c.section_id.as_str()).collect();
        assert_eq!(sibling_ids, ["Abs. 1", "Abs. 3"]);
    }

    #[tokio::test]
    async fn batch_context_skips_unknown_ids() {
        let store = MemoryVectorStore::new();
        let contexts = store.batch_context(&["missing".to_string()]).await.unwrap();
        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn kv_ttl_expiry() {
        let kv = MemoryKvStore::default();
        kv.setex("k", Duration::from_millis(20), b"v".to_vec())
            .await
            .unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(b"v".to_vec()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn kv_pattern_delete() {
        let kv = MemoryKvStore::default();
        let ttl = Duration::from_secs(60);
        kv.setex("query:a:1", ttl, vec![1]).await.unwrap();
        kv.setex("query:a:2", ttl, vec![2]).await.unwrap();
        kv.setex("pii:r", ttl, vec![3]).await.unwrap();

        let keys = kv.keys("query:a:*").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(kv.delete_many(&keys).await.unwrap(), 2);
        assert_eq!(kv.keys("query:*").await.unwrap().len(), 0);
        assert_eq!(kv.keys("pii:*").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn document_duplicate_lookup_ignores_deleted() {
        let docs = MemoryDocumentStore::new();
        let doc = Document {
            doc_id: Uuid::new_v4(),
            user_id: "u1".into(),
            filename: "a.txt".into(),
            doc_hash: "h1".into(),
            size_bytes: 10,
            metadata: serde_json::Value::Null,
            status: DocumentStatus::Active,
            created_at: Utc::now(),
        };
        docs.create(doc.clone()).await.unwrap();
        assert!(docs.find_by_hash("u1", "h1").await.unwrap().is_some());

        docs.set_status(doc.doc_id, DocumentStatus::Deleted)
            .await
            .unwrap();
        assert!(docs.find_by_hash("u1", "h1").await.unwrap().is_none());
    }
}
