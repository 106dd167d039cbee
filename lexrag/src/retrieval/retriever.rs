//! Hierarchical retrieval with context enrichment.
//!
//! ```text
//! query ──► cache? ──hit──► results
//!             │miss
//!             ▼
//!        embed_one ──► VectorStore::match_chunks ──► VectorStore::batch_context
//!                                                        (ONE call)
//!                                  │
//!                          [RetrievalResult] ──► cache ──► caller
//! ```
//!
//! The context enrichment is a single batched backend call for all hits; a
//! per-hit lookup loop is a contract violation.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::errors::LexError;
use crate::ports::{ChunkContext, Embedder, VectorStore};
use crate::types::RetrievalResult;

use super::cache::{QueryCache, query_cache_key};

/// Siblings rendered per result in the LLM context.
const MAX_SIBLINGS_IN_CONTEXT: usize = 3;
/// Character cap per rendered sibling.
const SIBLING_TRUNCATE_CHARS: usize = 200;

/// Retrieves ranked, context-enriched chunks for a query against one
/// document.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    cache: QueryCache,
}

impl Retriever {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>, cache: QueryCache) -> Self {
        Self {
            embedder,
            vectors,
            cache,
        }
    }

    /// Retrieve the `top_k` most similar chunks above `match_threshold`,
    /// each enriched with parent and sibling content.
    ///
    /// Results are ordered by similarity descending. Identical inputs within
    /// the cache TTL return byte-identical results.
    pub async fn retrieve(
        &self,
        query: &str,
        doc_id: &str,
        top_k: usize,
        match_threshold: f32,
    ) -> Result<Vec<RetrievalResult>, LexError> {
        let cache_key = query_cache_key(doc_id, query, top_k, match_threshold);

        if let Some(results) = self.cache.get(&cache_key).await {
            metrics::counter!("lexrag_cache_hits_total", "cache" => "query_results").increment(1);
            tracing::info!(doc_id, hits = results.len(), "query cache hit");
            return Ok(results);
        }
        metrics::counter!("lexrag_cache_misses_total", "cache" => "query_results").increment(1);

        let query_vector = self.embedder.embed_one(query).await?;

        let matches = self
            .vectors
            .match_chunks(&query_vector, doc_id, match_threshold, top_k)
            .await?;
        if matches.is_empty() {
            tracing::warn!(doc_id, "no chunks matched the query");
            return Ok(Vec::new());
        }

        // Single batched backend call for every hit's context.
        let chunk_ids: Vec<String> = matches.iter().map(|m| m.chunk_id.clone()).collect();
        let mut contexts = self.vectors.batch_context(&chunk_ids).await?;

        let results: Vec<RetrievalResult> = matches
            .into_iter()
            .map(|m| {
                let context = contexts.remove(&m.chunk_id).unwrap_or_default();
                let ChunkContext {
                    parent, siblings, ..
                } = context;
                RetrievalResult {
                    chunk_id: m.chunk_id,
                    section_id: m.section_id,
                    content: m.content,
                    similarity: m.similarity,
                    parent_content: parent.map(|p| p.content),
                    sibling_contents: siblings.into_iter().map(|s| s.content).collect(),
                }
            })
            .collect();

        tracing::info!(
            doc_id,
            top_k,
            hits = results.len(),
            avg_similarity = results.iter().map(|r| r.similarity).sum::<f32>() / results.len() as f32,
            "retrieval complete"
        );

        self.cache.put(&cache_key, &results).await;
        Ok(results)
    }

    /// Render results into the model context block. Deterministic for
    /// identical inputs.
    #[must_use]
    pub fn format_context(results: &[RetrievalResult]) -> String {
        let mut out = String::new();
        for (i, result) in results.iter().enumerate() {
            let _ = writeln!(out, "### Retrieved Section {}: {}\n", i + 1, result.section_id);

            if let Some(parent) = &result.parent_content {
                let _ = writeln!(out, "**Parent Context:**\n{parent}\n");
            }

            let _ = writeln!(out, "**Target Content:**\n{}\n", result.content);

            if !result.sibling_contents.is_empty() {
                out.push_str("**Related Sections:**\n");
                for (j, sibling) in result
                    .sibling_contents
                    .iter()
                    .take(MAX_SIBLINGS_IN_CONTEXT)
                    .enumerate()
                {
                    let shortened: String =
                        sibling.chars().take(SIBLING_TRUNCATE_CHARS).collect();
                    let _ = writeln!(out, "{}. {shortened}...", j + 1);
                }
            }

            let _ = writeln!(out, "\n*(Relevance: {:.1}%)*", result.similarity * 100.0);
            out.push_str(&"-".repeat(80));
            out.push_str("\n\n");
        }
        out
    }

    /// Best-effort invalidation of cached queries against a document.
    pub async fn invalidate_document(&self, doc_id: &str) -> usize {
        self.cache.invalidate(&format!("query:{doc_id}:*")).await
    }
}
