use std::time::Duration;

/// Failures reported by the text-generation backend or raised while waiting on it.
///
/// Backend errors are propagated to the caller as-is. The only retry the engine
/// performs is the single validation retry, which is not a backend error.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network_error",
            Self::Server { .. } => "server_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Cancelled => "cancelled",
        }
    }
}
