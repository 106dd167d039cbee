//! Deterministic local embedder for tests and offline development.
//!
//! [`HashedEmbedder`] projects a bag of lowercased word hashes into a fixed
//! dimension and L2-normalizes the result. It captures lexical overlap only,
//! which is exactly what deterministic pipeline tests need: identical texts
//! embed identically, disjoint texts score near zero. Production wires a
//! real model behind the same [`Embedder`] port.

use async_trait::async_trait;
use std::hash::{Hash, Hasher};

use crate::errors::LexError;
use crate::ports::Embedder;

/// Cosine similarity of two equal-length vectors. Zero-norm inputs score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Feature-hashed bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dim: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashedEmbedder {
    /// Create an embedder with the given output dimension.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "embedding dimension must be positive");
        Self { dim }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = rustc_hash::FxHasher::default();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dim as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LexError> {
        Ok(self.encode(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LexError> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }
}
