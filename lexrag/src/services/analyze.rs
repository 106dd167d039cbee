//! The analyze pipeline: retrieve → anonymize → model → de-anonymize →
//! verify → audit.
//!
//! Ordering within a request is strict; no step starts before the previous
//! completes. The leakage gate sits immediately before the model call: if
//! the anonymized query or context still carries PII, the request dies
//! without the model ever seeing it.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::LexError;
use crate::pii::PiiAnonymizer;
use crate::ports::{DocumentStore, LlmClient, QueryLog};
use crate::retrieval::Retriever;
use crate::types::{DocumentStatus, QueryLogEntry, sha256_hex};
use crate::verify::{Citation, SourceRefetcher, SourceSnippet, TrustLabel, Verifier,
    match_citations};

/// One analyze call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AnalyzeRequest {
    pub file_id: Uuid,
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Request-level bookkeeping returned to the caller.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnalyzeMetadata {
    pub latency_ms: u64,
    pub tokens_used: u64,
    pub chunks_retrieved: usize,
    pub model_version: String,
    pub pii_entities_anonymized: usize,
}

/// The verified, de-anonymized answer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalyzeResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub trust_label: TrustLabel,
    pub request_id: String,
    pub unsupported_claims: Vec<String>,
    pub metadata: AnalyzeMetadata,
}

/// Orchestrates one PII-protected question-answering request.
pub struct AnalyzeService {
    documents: Arc<dyn DocumentStore>,
    retriever: Retriever,
    anonymizer: PiiAnonymizer,
    llm: Arc<dyn LlmClient>,
    verifier: Verifier,
    query_log: Arc<dyn QueryLog>,
    refetcher: Option<Arc<dyn SourceRefetcher>>,
    settings: Settings,
}

impl AnalyzeService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        retriever: Retriever,
        anonymizer: PiiAnonymizer,
        llm: Arc<dyn LlmClient>,
        verifier: Verifier,
        query_log: Arc<dyn QueryLog>,
        refetcher: Option<Arc<dyn SourceRefetcher>>,
        settings: Settings,
    ) -> Self {
        Self {
            documents,
            retriever,
            anonymizer,
            llm,
            verifier,
            query_log,
            refetcher,
            settings,
        }
    }

    #[must_use]
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Run the full analyze pipeline for one request.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, LexError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        let query = request.query.trim();
        if query.is_empty() {
            return Err(LexError::validation("query must not be empty"));
        }
        let top_k = self.settings.effective_top_k(request.top_k);

        let document = self
            .documents
            .get(request.file_id)
            .await?
            .filter(|d| d.status == DocumentStatus::Active)
            .ok_or_else(|| LexError::not_found(format!("document {}", request.file_id)))?;

        tracing::info!(request_id, document_id = %document.doc_id, top_k, "analyze started");

        // 1. Retrieval with hierarchical context.
        let results = self
            .retriever
            .retrieve(
                query,
                &document.doc_id.to_string(),
                top_k,
                self.settings.match_threshold,
            )
            .await?;
        if results.is_empty() {
            return Err(LexError::not_found("no relevant sections found for query"));
        }
        let context = Retriever::format_context(&results);

        // 2. Anonymization of everything that crosses the model boundary.
        let context_request_id = format!("{request_id}_context");
        let (anon_query, query_mapping) = self.anonymizer.anonymize(query, &request_id).await?;
        let (anon_context, _context_mapping) = self
            .anonymizer
            .anonymize(&context, &context_request_id)
            .await?;

        // 3. Leakage gate. Nothing reaches the model past a failure here.
        if !self.anonymizer.verify_no_leakage(&anon_query) {
            return Err(LexError::PiiLeakage { context: "query" });
        }
        if !self.anonymizer.verify_no_leakage(&anon_context) {
            return Err(LexError::PiiLeakage { context: "context" });
        }

        // 4. Generative model.
        let llm_answer = self
            .llm
            .analyze(&anon_query, &anon_context, &request_id)
            .await?;

        // 5. Restore PII, drop the context mapping.
        let answer = self
            .anonymizer
            .deanonymize(&llm_answer.answer, &request_id)
            .await?;
        self.anonymizer.discard_mapping(&context_request_id).await?;

        // 6. Sentence-level verification against the retrieved sources.
        let sources: Vec<SourceSnippet> = results.iter().map(Into::into).collect();
        let outcome = self
            .verifier
            .verify_with_retry(&answer, sources, self.refetcher.as_deref())
            .await?;

        let citations = match_citations(&outcome.citations, &results);
        let latency_ms = started.elapsed().as_millis() as u64;

        // 7. PII-free audit trail.
        self.query_log
            .append(QueryLogEntry {
                document_id: document.doc_id,
                query_hash: sha256_hex(query.as_bytes()),
                response_hash: sha256_hex(answer.as_bytes()),
                latency_ms,
                tokens_used: Some(llm_answer.tokens_used),
                model_version: Some(llm_answer.model_version.clone()),
                citations_count: citations.len(),
                confidence: outcome.confidence,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            request_id,
            latency_ms,
            confidence = outcome.confidence,
            label = %outcome.trust_label,
            citations = citations.len(),
            "analyze complete"
        );

        Ok(AnalyzeResponse {
            answer,
            citations,
            confidence: outcome.confidence,
            trust_label: outcome.trust_label,
            request_id,
            unsupported_claims: outcome.unsupported_sentences(),
            metadata: AnalyzeMetadata {
                latency_ms,
                tokens_used: llm_answer.tokens_used,
                chunks_retrieved: results.len(),
                model_version: llm_answer.model_version,
                pii_entities_anonymized: query_mapping.len(),
            },
        })
    }

    /// Audit records for a document, newest first.
    pub async fn history(
        &self,
        document_id: Uuid,
        limit: usize,
    ) -> Result<Vec<QueryLogEntry>, LexError> {
        if self.documents.get(document_id).await?.is_none() {
            return Err(LexError::not_found(format!("document {document_id}")));
        }
        self.query_log.for_document(document_id, limit).await
    }
}
