use concierge_core::errors::BackendError;
use concierge_store::StoreError;

/// Errors that abort a turn. Nothing is saved when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The terminal answer failed validation twice.
    #[error("response validation failed after retry: {reason}")]
    ValidationExhausted { reason: String },

    #[error("intent classification failed: {0}")]
    Classification(String),

    #[error("conversation state invariant violated: {0}")]
    InvalidState(String),
}

impl EngineError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Backend(e) => e.error_kind(),
            Self::Store(_) => "store_error",
            Self::ValidationExhausted { .. } => "validation_exhausted",
            Self::Classification(_) => "classification_error",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}
