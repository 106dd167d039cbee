//! Shared fixtures for the integration suites: counting wrappers around the
//! in-memory backends and a fully wired service stack.
#![allow(dead_code)]

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use lexrag::Settings;
use lexrag::embed::HashedEmbedder;
use lexrag::errors::LexError;
use lexrag::pii::{PiiAnonymizer, RegexPiiDetector};
use lexrag::ports::{
    ChunkContext, DistanceMetric, Embedder, LlmAnswer, LlmClient, VectorMatch, VectorPoint,
    VectorStore,
};
use lexrag::retrieval::{QueryCache, Retriever};
use lexrag::services::{AnalyzeService, IndexOutcome, IndexRequest, IndexerService};
use lexrag::stores::{MemoryDocumentStore, MemoryKvStore, MemoryQueryLog, MemoryVectorStore};
use lexrag::verify::{
    ConfidenceEngine, FingerprintTracker, GermanLegalSplitter, LegalCitationExtractor,
    SemanticMatcher, SentenceProcessor, Verifier,
};

/// Embedder that counts how often each entry point is hit.
pub struct CountingEmbedder {
    inner: HashedEmbedder,
    pub one_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashedEmbedder::default(),
            one_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LexError> {
        self.one_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LexError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

/// Vector store that counts backend calls, for the no-N+1 property.
pub struct CountingVectorStore {
    inner: MemoryVectorStore,
    pub match_calls: AtomicUsize,
    pub context_calls: AtomicUsize,
}

impl CountingVectorStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryVectorStore::new(),
            match_calls: AtomicUsize::new(0),
            context_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorStore for CountingVectorStore {
    async fn create_collection(
        &self,
        dim: usize,
        metric: DistanceMetric,
        recreate: bool,
    ) -> Result<(), LexError> {
        self.inner.create_collection(dim, metric, recreate).await
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), LexError> {
        self.inner.upsert(points).await
    }

    async fn match_chunks(
        &self,
        vector: &[f32],
        doc_id: &str,
        min_similarity: f32,
        k: usize,
    ) -> Result<Vec<VectorMatch>, LexError> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .match_chunks(vector, doc_id, min_similarity, k)
            .await
    }

    async fn batch_context(
        &self,
        chunk_ids: &[String],
    ) -> Result<FxHashMap<String, ChunkContext>, LexError> {
        self.context_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.batch_context(chunk_ids).await
    }

    async fn delete_by_doc(&self, doc_id: &str) -> Result<usize, LexError> {
        self.inner.delete_by_doc(doc_id).await
    }
}

/// Generative model stub returning a fixed answer and counting calls.
pub struct ScriptedLlm {
    pub answer: String,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn analyze(
        &self,
        _anon_query: &str,
        _anon_context: &str,
        _request_id: &str,
    ) -> Result<LlmAnswer, LexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmAnswer {
            answer: self.answer.clone(),
            tokens_used: 321,
            model_version: "stub-1".to_string(),
        })
    }
}

/// Everything an end-to-end test needs, wired over shared in-memory
/// backends.
pub struct TestStack {
    pub settings: Settings,
    pub indexer: IndexerService,
    pub analyze: AnalyzeService,
    pub embedder: Arc<CountingEmbedder>,
    pub vectors: Arc<CountingVectorStore>,
    pub kv: Arc<MemoryKvStore>,
    pub llm: Arc<ScriptedLlm>,
    pub query_log: Arc<MemoryQueryLog>,
}

/// Detector that flags the first character of any non-empty text. Whatever
/// the anonymizer substitutes still trips the leakage check, which makes it
/// a deterministic way to exercise the abort-before-model path.
pub struct AlwaysLeakyDetector;

impl lexrag::ports::PiiDetector for AlwaysLeakyDetector {
    fn detect(&self, text: &str) -> Vec<lexrag::ports::PiiSpan> {
        let first_char_len = match text.chars().next() {
            Some(c) => c.len_utf8(),
            None => return Vec::new(),
        };
        vec![lexrag::ports::PiiSpan {
            start: 0,
            end: first_char_len,
            kind: lexrag::ports::PiiKind::Person,
            value: text[..first_char_len].to_string(),
        }]
    }
}

pub fn build_stack(llm_answer: &str, settings: Settings) -> TestStack {
    build_stack_with(llm_answer, settings, Arc::new(RegexPiiDetector::new()))
}

pub fn build_stack_with(
    llm_answer: &str,
    settings: Settings,
    detector: Arc<dyn lexrag::ports::PiiDetector>,
) -> TestStack {
    let embedder = Arc::new(CountingEmbedder::new());
    let vectors = Arc::new(CountingVectorStore::new());
    let kv = Arc::new(MemoryKvStore::default());
    let documents = Arc::new(MemoryDocumentStore::new());
    let query_log = Arc::new(MemoryQueryLog::new());
    let llm = Arc::new(ScriptedLlm::new(llm_answer));

    let cache = QueryCache::new(
        kv.clone(),
        settings.cache_query_results_ttl,
        settings.cache_enabled,
    );
    let retriever = Retriever::new(embedder.clone(), vectors.clone(), cache.clone());
    let anonymizer = PiiAnonymizer::new(detector, kv.clone(), settings.pii_mapping_ttl);
    let verifier = Verifier::new(
        SentenceProcessor::new(
            Arc::new(GermanLegalSplitter::new()),
            Arc::new(LegalCitationExtractor::new()),
        ),
        SemanticMatcher::new(embedder.clone(), settings.embedding_cache_size),
        ConfidenceEngine::new(settings.sentence_threshold, settings.overall_threshold),
        Arc::new(FingerprintTracker::new()),
        &settings,
    );

    let indexer = IndexerService::new(
        embedder.clone(),
        vectors.clone(),
        documents.clone(),
        cache,
        None,
        &settings,
    );
    let analyze = AnalyzeService::new(
        documents,
        retriever,
        anonymizer,
        llm.clone(),
        verifier,
        query_log.clone(),
        None,
        settings.clone(),
    );

    TestStack {
        settings,
        indexer,
        analyze,
        embedder,
        vectors,
        kv,
        llm,
        query_log,
    }
}

/// Index a plain-text document and return its id and outcome.
pub async fn index_text(stack: &TestStack, text: &str) -> (Uuid, IndexOutcome) {
    let outcome = stack
        .indexer
        .index(IndexRequest {
            user_id: "test-user".into(),
            filename: format!("doc-{}.txt", Uuid::new_v4()),
            bytes: text.as_bytes().to_vec(),
        })
        .await
        .expect("indexing test document");
    (outcome.document_id, outcome)
}
