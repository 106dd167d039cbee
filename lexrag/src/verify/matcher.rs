//! Semantic matching of sentences against source snippets.
//!
//! Embeddings come from the [`Embedder`] port and are memoized in an LRU
//! cache keyed by a 16-char hash of the text, so verifying one sentence
//! against K sources costs one query embed plus K source embeds that are
//! shared across the whole batch.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::embed::cosine_similarity;
use crate::errors::LexError;
use crate::ports::Embedder;
use crate::types::short_hash16;

/// Verdict for one sentence against all sources.
#[derive(Debug, Clone)]
pub struct SentenceVerdict {
    pub sentence: String,
    /// Highest similarity across sources.
    pub max_score: f32,
    /// Index of the best-matching source, `None` when there are no sources.
    pub best_source: Option<usize>,
    pub verified: bool,
    /// Similarity per source, in source order.
    pub all_scores: Vec<f32>,
}

/// Aggregate over every sentence of an answer.
#[derive(Debug, Clone)]
pub struct AnswerVerification {
    pub verdicts: Vec<SentenceVerdict>,
    pub verified_count: usize,
    pub total_count: usize,
    pub verification_rate: f32,
}

/// Embedding-cache counters.
#[derive(Debug, Clone, Copy)]
pub struct MatcherCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

struct CacheState {
    embeddings: LruCache<String, Arc<Vec<f32>>>,
    hits: u64,
    misses: u64,
}

/// Sentence-to-source similarity scorer with an embedding cache.
pub struct SemanticMatcher {
    embedder: Arc<dyn Embedder>,
    cache: Mutex<CacheState>,
}

impl SemanticMatcher {
    /// # Panics
    ///
    /// Panics if `cache_size` is zero.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).expect("embedding cache size must be non-zero");
        Self {
            embedder,
            cache: Mutex::new(CacheState {
                embeddings: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Embed a text, serving repeats from the cache.
    pub async fn encode(&self, text: &str) -> Result<Arc<Vec<f32>>, LexError> {
        let key = short_hash16(text);
        if let Some(cached) = {
            let mut cache = self.cache.lock();
            let hit = cache.embeddings.get(&key).cloned();
            if hit.is_some() {
                cache.hits += 1;
            }
            hit
        } {
            return Ok(cached);
        }

        let embedding = Arc::new(self.embedder.embed_one(text).await?);
        let mut cache = self.cache.lock();
        cache.misses += 1;
        cache.embeddings.put(key, embedding.clone());
        Ok(embedding)
    }

    /// Cosine similarity between two texts.
    pub async fn similarity(&self, a: &str, b: &str) -> Result<f32, LexError> {
        let va = self.encode(a).await?;
        let vb = self.encode(b).await?;
        Ok(cosine_similarity(&va, &vb))
    }

    /// Score one sentence against every source.
    pub async fn verify_sentence(
        &self,
        sentence: &str,
        sources: &[String],
        threshold: f32,
    ) -> Result<SentenceVerdict, LexError> {
        if sources.is_empty() {
            return Ok(SentenceVerdict {
                sentence: sentence.to_string(),
                max_score: 0.0,
                best_source: None,
                verified: false,
                all_scores: Vec::new(),
            });
        }

        let sentence_vec = self.encode(sentence).await?;
        let mut all_scores = Vec::with_capacity(sources.len());
        for source in sources {
            let source_vec = self.encode(source).await?;
            all_scores.push(cosine_similarity(&sentence_vec, &source_vec));
        }

        let (best_source, max_score) = all_scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, s)| (Some(i), s))
            .unwrap_or((None, 0.0));

        Ok(SentenceVerdict {
            sentence: sentence.to_string(),
            max_score,
            best_source,
            verified: max_score >= threshold,
            all_scores,
        })
    }

    /// Score every sentence of an answer. Source embeddings are computed at
    /// most once thanks to the cache.
    pub async fn verify_answer(
        &self,
        sentences: &[String],
        sources: &[String],
        threshold: f32,
    ) -> Result<AnswerVerification, LexError> {
        let mut verdicts = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            verdicts.push(self.verify_sentence(sentence, sources, threshold).await?);
        }

        let verified_count = verdicts.iter().filter(|v| v.verified).count();
        let total_count = verdicts.len();
        Ok(AnswerVerification {
            verified_count,
            total_count,
            verification_rate: if total_count == 0 {
                0.0
            } else {
                verified_count as f32 / total_count as f32
            },
            verdicts,
        })
    }

    #[must_use]
    pub fn cache_stats(&self) -> MatcherCacheStats {
        let cache = self.cache.lock();
        MatcherCacheStats {
            entries: cache.embeddings.len(),
            capacity: cache.embeddings.cap().get(),
            hits: cache.hits,
            misses: cache.misses,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().embeddings.clear();
    }
}
