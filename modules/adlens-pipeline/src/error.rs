use search_client::SearchError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline failures. `Clone` so one failed computation can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("Pipeline task failed: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Search(SearchError::Timeout(_)))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::Search(SearchError::RateLimited { .. }))
    }
}
