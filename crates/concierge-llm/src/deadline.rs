use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use concierge_core::errors::BackendError;
use concierge_core::generation::{Generation, GenerationRequest, TextGenerator};

/// Wraps a [`TextGenerator`] with a per-call deadline.
///
/// An elapsed deadline becomes [`BackendError::Timeout`]. Backend errors are
/// passed through untouched; nothing is retried here.
pub struct DeadlineGenerator<G: TextGenerator> {
    inner: G,
    timeout: Duration,
}

impl<G: TextGenerator> DeadlineGenerator<G> {
    pub fn new(inner: G, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for DeadlineGenerator<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.inner.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "text generation deadline elapsed"
                );
                Err(BackendError::Timeout(self.timeout))
            }
        }
    }
}
