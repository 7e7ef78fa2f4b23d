//! Per-kind search routing with deadlines and concurrent fragment fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use concierge_core::entity::{EntityKind, RankedEntity, SearchHit};
use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::backend::{SearchBackend, SearchError, SearchOptions};
use crate::merger::{self, FragmentHits};
use crate::ranker;

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes searches to the backend registered for each entity kind.
#[derive(Clone)]
pub struct SearchRouter {
    backends: HashMap<EntityKind, Arc<dyn SearchBackend>>,
    timeout: Duration,
}

impl SearchRouter {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a backend under the kind it reports. Replaces any earlier one.
    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn supports(&self, kind: EntityKind) -> bool {
        self.backends.contains_key(&kind)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One search call under the router's deadline. Results come back
    /// best-first, filtered to `min_score` and cut to `limit`.
    pub async fn search(
        &self,
        kind: EntityKind,
        fragment: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let backend = self
            .backends
            .get(&kind)
            .ok_or(SearchError::NotConfigured(kind))?;

        let mut hits = tokio::time::timeout(self.timeout, backend.search(fragment, opts))
            .await
            .map_err(|_| SearchError::Timeout(self.timeout))??;

        if let Some(floor) = opts.min_score {
            hits.retain(|h| h.fused_score >= floor);
        }
        ranker::sort_hits(&mut hits);
        if let Some(limit) = opts.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    /// Best single hit for `text`, if any clears `min_score`.
    pub async fn search_one(
        &self,
        kind: EntityKind,
        text: &str,
        min_score: Option<f64>,
    ) -> Result<Option<SearchHit>, SearchError> {
        let opts = SearchOptions {
            limit: Some(1),
            min_score,
        };
        Ok(self.search(kind, text, &opts).await?.into_iter().next())
    }

    /// Run the same search for every fragment concurrently.
    ///
    /// A failed or timed-out fragment contributes no hits; it never fails
    /// its siblings. Output order follows input order.
    #[instrument(skip_all, fields(kind = %kind, fragments = fragments.len()))]
    pub async fn fan_out(
        &self,
        kind: EntityKind,
        fragments: &[String],
        opts: &SearchOptions,
    ) -> Vec<FragmentHits> {
        let searches = fragments.iter().map(|fragment| async move {
            match self.search(kind, fragment, opts).await {
                Ok(hits) => FragmentHits::new(fragment.clone(), hits),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "fragment search failed");
                    FragmentHits::new(fragment.clone(), Vec::new())
                }
            }
        });
        let results = join_all(searches).await;
        debug!(
            hits = results.iter().map(|r| r.hits.len()).sum::<usize>(),
            "fan-out complete"
        );
        results
    }

    /// [`fan_out`](Self::fan_out) followed by the deduplicating merge.
    pub async fn search_merged(
        &self,
        kind: EntityKind,
        fragments: &[String],
        opts: &SearchOptions,
    ) -> Vec<RankedEntity> {
        if fragments.is_empty() || !self.supports(kind) {
            return Vec::new();
        }
        merger::merge(self.fan_out(kind, fragments, opts).await)
    }
}

impl Default for SearchRouter {
    fn default() -> Self {
        Self::new()
    }
}
