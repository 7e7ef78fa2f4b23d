use std::time::Duration;

use async_trait::async_trait;
use concierge_core::entity::{EntityKind, SearchHit};

/// Per-call search options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchOptions {
    /// `None` returns every hit above the floor.
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
}

impl SearchOptions {
    pub fn top(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            min_score: None,
        }
    }

    pub fn floor(min_score: f64) -> Self {
        Self {
            limit: None,
            min_score: Some(min_score),
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search timed out after {0:?}")]
    Timeout(Duration),
    #[error("search backend error: {0}")]
    Backend(String),
    #[error("no search backend configured for {0}")]
    NotConfigured(EntityKind),
}

/// A hybrid (vector + lexical) search over one entity kind.
///
/// Hits must carry `vector_score`/`lexical_score` alongside the fused score.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn search(&self, fragment: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>, SearchError>;
}
