//! Development stand-in for the generative model.
//!
//! Production deployments wire a real client behind [`LlmClient`]; this one
//! answers by quoting the most relevant context block, which keeps the full
//! pipeline (anonymization, verification, auditing) exercisable offline.

use async_trait::async_trait;

use lexrag::LexError;
use lexrag::ports::{LlmAnswer, LlmClient};

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoLlm;

#[async_trait]
impl LlmClient for EchoLlm {
    async fn analyze(
        &self,
        _anon_query: &str,
        anon_context: &str,
        _request_id: &str,
    ) -> Result<LlmAnswer, LexError> {
        let quoted = anon_context
            .lines()
            .skip_while(|line| !line.starts_with("**Target Content:**"))
            .nth(1)
            .unwrap_or("Keine relevante Passage gefunden.")
            .trim()
            .to_string();

        Ok(LlmAnswer {
            tokens_used: (anon_context.len() / 4) as u64,
            model_version: "echo-dev".to_string(),
            answer: quoted,
        })
    }
}
