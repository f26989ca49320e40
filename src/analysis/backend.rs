use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Verdict;

use super::response::interpret_reply;

/// A model that answers a prompt with free text.
#[async_trait]
pub trait AiBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str, text: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
        }
    }
}

/// Delegates the relevance decision to an [`AiBackend`].
pub struct AiAnalyzer {
    backend: Arc<dyn AiBackend>,
    prompt: String,
    retry: RetryPolicy,
}

impl AiAnalyzer {
    pub fn new(backend: Arc<dyn AiBackend>, prompt: impl Into<String>) -> Self {
        Self {
            backend,
            prompt: prompt.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Fails with `AnalysisUnavailable` once the backend cannot answer;
    /// an outage is never turned into a verdict.
    pub async fn evaluate(&self, text: &str) -> Result<Verdict> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 0;

        loop {
            match self.backend.complete(&self.prompt, text).await {
                Ok(reply) => return Ok(interpret_reply(&reply)),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        backend = self.backend.name(),
                        attempt,
                        error = %e,
                        "AI backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f32(1.5);
                }
                Err(e) => {
                    return Err(AppError::AnalysisUnavailable(format!(
                        "{}: {e}",
                        self.backend.name()
                    )))
                }
            }
        }
    }
}
