use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use concierge_core::errors::BackendError;
use concierge_core::generation::{Generation, GenerationRequest, TextGenerator, ToolCallRequest};

/// Pre-programmed responses for deterministic testing without a backend.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this generation as-is.
    Generation(Generation),
    /// Return an error from `complete()`.
    Error(BackendError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A terminal structured answer.
    pub fn json(text: Value, usage: u64) -> Self {
        Self::Generation(Generation::terminal(text, usage))
    }

    /// A request for one or more tool calls.
    pub fn tools(usage: u64, calls: Vec<ToolCallRequest>) -> Self {
        Self::Generation(Generation::with_tool_calls(usage, calls))
    }

    /// A single tool call.
    pub fn tool(name: &str, arguments: Value, usage: u64) -> Self {
        Self::tools(usage, vec![ToolCallRequest::new(name, arguments)])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Generator that returns pre-programmed responses in sequence and records
/// every request it receives.
pub struct MockGenerator {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<GenerationRequest>>,
    call_count: AtomicUsize,
}

impl MockGenerator {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Queue another response after the ones already configured.
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Snapshot of every request received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let response = self.responses.lock().pop_front();
        match response {
            Some(response) => resolve_response(response).await,
            None => Err(BackendError::InvalidResponse(format!(
                "MockGenerator: no response configured for call {idx}"
            ))),
        }
    }
}

/// Unrolls nested delays iteratively.
async fn resolve_response(response: MockResponse) -> Result<Generation, BackendError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Generation(generation) => return Ok(generation),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
