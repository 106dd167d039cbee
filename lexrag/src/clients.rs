//! Retry decorators for the external-service ports.
//!
//! External calls may fail transiently; these wrappers retry retryable
//! errors with bounded exponential backoff before surfacing the failure.
//! Validation-class errors pass through untouched on the first attempt.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::LexError;
use crate::ports::{Embedder, LlmAnswer, LlmClient};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt `attempt` (0-based).
    #[must_use]
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` under the policy. Non-retryable errors surface immediately.
pub async fn retry_with<T, F, Fut>(
    policy: RetryPolicy,
    what: &'static str,
    mut op: F,
) -> Result<T, LexError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LexError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    what,
                    attempt = attempt + 1,
                    ?delay,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`Embedder`] decorated with retries.
pub struct RetryingEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    #[must_use]
    pub fn new(inner: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LexError> {
        retry_with(self.policy, "embed_one", || self.inner.embed_one(text)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LexError> {
        retry_with(self.policy, "embed_batch", || self.inner.embed_batch(texts)).await
    }
}

/// [`LlmClient`] decorated with retries.
pub struct RetryingLlm {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl RetryingLlm {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmClient for RetryingLlm {
    async fn analyze(
        &self,
        anon_query: &str,
        anon_context: &str,
        request_id: &str,
    ) -> Result<LlmAnswer, LexError> {
        retry_with(self.policy, "llm_analyze", || {
            self.inner.analyze(anon_query, anon_context, request_id)
        })
        .await
    }
}
