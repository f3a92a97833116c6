use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl SearchError {
    /// Whether a retry policy may re-issue the call that produced this error.
    /// 4xx responses other than 429 are caller mistakes and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Timeout(_) | SearchError::RateLimited { .. } | SearchError::Network(_) => {
                true
            }
            SearchError::Api { status, .. } => *status >= 500,
            SearchError::Configuration(_) | SearchError::Malformed(_) => false,
        }
    }

    /// Server-suggested delay, only ever present on rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SearchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured deadline
            SearchError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            SearchError::Malformed(err.to_string())
        } else {
            SearchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Malformed(err.to_string())
    }
}
