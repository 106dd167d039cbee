//! Document indexing service.
//!
//! Upload bytes in, searchable chunks out: hash, duplicate check, optional
//! OCR for PDFs, hierarchical parse, chunk, embed in one batch, upsert,
//! register the document, invalidate stale cached queries.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::LexError;
use crate::parser::{Chunker, DocumentParser};
use crate::ports::{DistanceMetric, DocumentStore, Embedder, OcrClient, VectorPoint, VectorStore};
use crate::retrieval::QueryCache;
use crate::types::{Document, DocumentStatus, sha256_hex};

/// Extensions accepted for upload. Anything else is rejected up front.
const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// One upload to index.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub user_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Result of a successful indexing run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexOutcome {
    pub document_id: Uuid,
    pub filename: String,
    pub chunks_created: usize,
    pub status: String,
}

/// Parses, embeds, and stores uploaded documents.
pub struct IndexerService {
    parser: DocumentParser,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    cache: QueryCache,
    ocr: Option<Arc<dyn OcrClient>>,
    max_upload_bytes: u64,
}

impl IndexerService {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        cache: QueryCache,
        ocr: Option<Arc<dyn OcrClient>>,
        settings: &Settings,
    ) -> Self {
        Self {
            parser: DocumentParser::new(),
            chunker: Chunker::from_settings(settings),
            embedder,
            vectors,
            documents,
            cache,
            ocr,
            max_upload_bytes: settings.max_upload_bytes,
        }
    }

    /// Index one uploaded document end to end.
    pub async fn index(&self, request: IndexRequest) -> Result<IndexOutcome, LexError> {
        self.validate(&request)?;

        let doc_hash = sha256_hex(&request.bytes);
        if let Some(existing) = self
            .documents
            .find_by_hash(&request.user_id, &doc_hash)
            .await?
        {
            return Err(LexError::Conflict(format!(
                "document already indexed as {}",
                existing.doc_id
            )));
        }

        let request_id = Uuid::new_v4().to_string();
        let text = self.extract_text(&request, &request_id).await?;

        let sections = self.parser.parse(&text);
        if sections.is_empty() {
            return Err(LexError::validation("document contains no parseable text"));
        }

        let document_id = Uuid::new_v4();
        let chunks = self.chunker.chunk(&sections, &document_id.to_string());

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        tracing::info!(%document_id, chunks = chunks.len(), "embedding chunks");
        let vectors = self.embedder.embed_batch(&texts).await?;

        self.vectors
            .create_collection(self.embedder.dim(), DistanceMetric::Cosine, false)
            .await?;

        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(mut chunk, vector)| {
                chunk.embedding = Some(vector.clone());
                VectorPoint {
                    numeric_id: numeric_point_id(&chunk.chunk_id),
                    chunk,
                    vector,
                }
            })
            .collect();
        let chunks_created = points.len();
        self.vectors.upsert(points).await?;

        self.documents
            .create(Document {
                doc_id: document_id,
                user_id: request.user_id.clone(),
                filename: request.filename.clone(),
                doc_hash,
                size_bytes: request.bytes.len() as u64,
                metadata: serde_json::json!({ "chunks": chunks_created }),
                status: DocumentStatus::Active,
                created_at: Utc::now(),
            })
            .await?;

        // A fresh index replaces anything a stale cache entry might claim.
        self.cache
            .invalidate(&format!("query:{document_id}:*"))
            .await;

        tracing::info!(%document_id, chunks_created, filename = %request.filename, "document indexed");
        Ok(IndexOutcome {
            document_id,
            filename: request.filename,
            chunks_created,
            status: "indexed".to_string(),
        })
    }

    /// Soft-delete a document and remove its vectors. Cached queries for it
    /// are invalidated best-effort.
    pub async fn delete(&self, document_id: Uuid) -> Result<usize, LexError> {
        if self.documents.get(document_id).await?.is_none() {
            return Err(LexError::not_found(format!("document {document_id}")));
        }
        self.documents
            .set_status(document_id, DocumentStatus::Deleted)
            .await?;
        let removed = self.vectors.delete_by_doc(&document_id.to_string()).await?;
        self.cache
            .invalidate(&format!("query:{document_id}:*"))
            .await;
        tracing::info!(%document_id, removed, "document deleted");
        Ok(removed)
    }

    fn validate(&self, request: &IndexRequest) -> Result<(), LexError> {
        if request.bytes.is_empty() {
            return Err(LexError::validation("uploaded file is empty"));
        }
        let size = request.bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(LexError::PayloadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        if extension_of(&request.filename)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .is_none()
        {
            return Err(LexError::Validation(format!(
                "unsupported file extension: {}",
                request.filename
            )));
        }
        Ok(())
    }

    async fn extract_text(
        &self,
        request: &IndexRequest,
        request_id: &str,
    ) -> Result<String, LexError> {
        if extension_of(&request.filename).as_deref() == Some("pdf") {
            let Some(ocr) = &self.ocr else {
                return Err(LexError::external("ocr", "no OCR client configured"));
            };
            if !ocr.is_available() {
                return Err(LexError::external("ocr", "OCR service unavailable"));
            }
            let result = ocr.process(&request.bytes, false, request_id).await?;
            return Ok(result.text);
        }

        String::from_utf8(request.bytes.clone())
            .map_err(|_| LexError::validation("file is not valid UTF-8 text"))
    }
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Numeric point id for the vector backend: the leading 64 bits of the
/// chunk id hash.
#[must_use]
pub fn numeric_point_id(chunk_id: &str) -> u64 {
    let hex16: String = chunk_id.chars().take(16).collect();
    u64::from_str_radix(&hex16, 16).unwrap_or_else(|_| {
        // Chunk ids not produced by the chunker still get a stable id.
        u64::from_str_radix(&crate::types::short_hash16(chunk_id), 16).unwrap_or(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashedEmbedder;
    use crate::stores::{MemoryDocumentStore, MemoryKvStore, MemoryVectorStore};
    use std::time::Duration;

    fn service() -> (IndexerService, Arc<MemoryVectorStore>, Arc<MemoryDocumentStore>) {
        let vectors = Arc::new(MemoryVectorStore::new());
        let documents = Arc::new(MemoryDocumentStore::new());
        let cache = QueryCache::new(
            Arc::new(MemoryKvStore::default()),
            Duration::from_secs(60),
            true,
        );
        let settings = Settings::default();
        (
            IndexerService::new(
                Arc::new(HashedEmbedder::default()),
                vectors.clone(),
                documents.clone(),
                cache,
                None,
                &settings,
            ),
            vectors,
            documents,
        )
    }

    fn upload(filename: &str, text: &str) -> IndexRequest {
        IndexRequest {
            user_id: "user-1".into(),
            filename: filename.into(),
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn index_creates_chunks_and_document() {
        let (service, vectors, documents) = service();
        let outcome = service
            .index(upload("bgb.txt", "§ 823 Wer vorsätzlich handelt. Absatz 1 gilt entsprechend."))
            .await
            .unwrap();
        assert_eq!(outcome.status, "indexed");
        assert!(outcome.chunks_created >= 2);
        assert_eq!(vectors.len(), outcome.chunks_created);
        assert!(documents.get(outcome.document_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_upload_conflicts() {
        let (service, _, _) = service();
        let text = "§ 1 Inhalt des Paragraphen.";
        service.index(upload("a.txt", text)).await.unwrap();
        let err = service.index(upload("b.txt", text)).await.unwrap_err();
        assert!(matches!(err, LexError::Conflict(_)));
    }

    #[tokio::test]
    async fn rejects_bad_uploads() {
        let (service, _, _) = service();
        assert!(matches!(
            service.index(upload("x.exe", "whatever")).await.unwrap_err(),
            LexError::Validation(_)
        ));
        assert!(matches!(
            service.index(upload("x.txt", "")).await.unwrap_err(),
            LexError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn oversize_upload_is_rejected_with_size() {
        let settings = Settings {
            max_upload_bytes: 8,
            ..Settings::default()
        };
        let service = IndexerService::new(
            Arc::new(HashedEmbedder::default()),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(MemoryDocumentStore::new()),
            QueryCache::new(
                Arc::new(MemoryKvStore::default()),
                Duration::from_secs(60),
                true,
            ),
            None,
            &settings,
        );
        let err = service
            .index(upload("big.txt", "viel zu viel Inhalt"))
            .await
            .unwrap_err();
        assert!(matches!(err, LexError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn pdf_without_ocr_is_an_external_failure() {
        let (service, _, _) = service();
        let err = service
            .index(upload("scan.pdf", "%PDF-1.4 fake"))
            .await
            .unwrap_err();
        assert!(matches!(err, LexError::ExternalUnavailable { .. }));
    }

    #[tokio::test]
    async fn delete_removes_vectors_and_flips_status() {
        let (service, vectors, documents) = service();
        let outcome = service
            .index(upload("doc.txt", "§ 5 Etwas Text hier."))
            .await
            .unwrap();
        let removed = service.delete(outcome.document_id).await.unwrap();
        assert_eq!(removed, outcome.chunks_created);
        assert_eq!(vectors.len(), 0);
        let doc = documents.get(outcome.document_id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Deleted);
    }

    #[test]
    fn numeric_ids_are_stable_and_distinct() {
        let a = numeric_point_id("00ff00ff00ff00ff");
        assert_eq!(a, numeric_point_id("00ff00ff00ff00ff"));
        assert_ne!(a, numeric_point_id("00ff00ff00ff00fe"));
    }
}
