//! Scripted search backend for deterministic tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use concierge_core::entity::{EntityKind, SearchHit};
use parking_lot::Mutex;

use crate::backend::{SearchBackend, SearchError, SearchOptions};

/// Returns pre-programmed hits keyed by fragment text.
///
/// Unknown fragments get the default hit list (empty unless set). Every call
/// is counted and its fragment recorded, so tests can assert that a code
/// path did or did not touch search.
pub struct ScriptedSearchBackend {
    kind: EntityKind,
    responses: HashMap<String, Vec<SearchHit>>,
    default: Vec<SearchHit>,
    failures: HashSet<String>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearchBackend {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            responses: HashMap::new(),
            default: Vec::new(),
            failures: HashSet::new(),
            delay: None,
            call_count: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, fragment: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.responses.insert(fragment.into(), hits);
        self
    }

    pub fn with_default(mut self, hits: Vec<SearchHit>) -> Self {
        self.default = hits;
        self
    }

    /// Make searches for `fragment` fail with a backend error.
    pub fn with_failure(mut self, fragment: impl Into<String>) -> Self {
        self.failures.insert(fragment.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearchBackend {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn search(&self, fragment: &str, _opts: &SearchOptions) -> Result<Vec<SearchHit>, SearchError> {
        let _ = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.queries.lock().push(fragment.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.contains(fragment) {
            return Err(SearchError::Backend(format!("scripted failure for '{fragment}'")));
        }
        Ok(self
            .responses
            .get(fragment)
            .unwrap_or(&self.default)
            .clone())
    }
}
