//! Shared application state: the wired core services.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use lexrag::Settings;
use lexrag::clients::{RetryPolicy, RetryingEmbedder, RetryingLlm};
use lexrag::pii::{PiiAnonymizer, RegexPiiDetector};
use lexrag::ports::{
    DocumentStore, Embedder, KvStore, LlmClient, OcrClient, PiiDetector, QueryLog, VectorStore,
};
use lexrag::retrieval::{QueryCache, Retriever};
use lexrag::services::{AnalyzeService, IndexerService};
use lexrag::verify::{
    CitationRegistry, ConfidenceEngine, FingerprintTracker, ModuleKey, SemanticMatcher,
    SentenceProcessor, SplitterRegistry, Verifier,
};

/// Everything the route handlers need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub settings: Settings,
    pub indexer: IndexerService,
    pub analyze: AnalyzeService,
    pub kv: Arc<dyn KvStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub cache: QueryCache,
    pub prometheus: Option<PrometheusHandle>,
}

/// External backends to wire the services over.
pub struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub kv: Arc<dyn KvStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub query_log: Arc<dyn QueryLog>,
    pub llm: Arc<dyn LlmClient>,
    pub ocr: Option<Arc<dyn OcrClient>>,
    pub pii_detector: Option<Arc<dyn PiiDetector>>,
}

impl AppState {
    /// Wire the full service stack over the given backends. Embedder and
    /// model calls are wrapped with bounded-backoff retries.
    #[must_use]
    pub fn new(settings: Settings, backends: Backends, prometheus: Option<PrometheusHandle>) -> Self {
        let retry = RetryPolicy::default();
        let embedder: Arc<dyn Embedder> =
            Arc::new(RetryingEmbedder::new(backends.embedder, retry));
        let llm: Arc<dyn LlmClient> = Arc::new(RetryingLlm::new(backends.llm, retry));

        let cache = QueryCache::new(
            backends.kv.clone(),
            settings.cache_query_results_ttl,
            settings.cache_enabled,
        );
        let retriever = Retriever::new(embedder.clone(), backends.vectors.clone(), cache.clone());
        let detector = backends
            .pii_detector
            .unwrap_or_else(|| Arc::new(RegexPiiDetector::new()));
        let anonymizer = PiiAnonymizer::new(detector, backends.kv.clone(), settings.pii_mapping_ttl);
        let module = ModuleKey::new("de", "legal");
        let splitters = SplitterRegistry::new();
        let citation_extractors = CitationRegistry::new();
        let verifier = Verifier::new(
            SentenceProcessor::new(splitters.get(&module), citation_extractors.get(&module)),
            SemanticMatcher::new(embedder.clone(), settings.embedding_cache_size),
            ConfidenceEngine::new(settings.sentence_threshold, settings.overall_threshold),
            Arc::new(FingerprintTracker::new()),
            &settings,
        );

        let indexer = IndexerService::new(
            embedder,
            backends.vectors.clone(),
            backends.documents.clone(),
            cache.clone(),
            backends.ocr,
            &settings,
        );
        let analyze = AnalyzeService::new(
            backends.documents,
            retriever,
            anonymizer,
            llm,
            verifier,
            backends.query_log,
            None,
            settings.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                settings,
                indexer,
                analyze,
                kv: backends.kv,
                vectors: backends.vectors,
                cache,
                prometheus,
            }),
        }
    }
}

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
