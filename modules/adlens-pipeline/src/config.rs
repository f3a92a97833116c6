use std::str::FromStr;
use std::time::Duration;

use search_client::{SearchClient, Upstream};
use tracing::info;

use crate::dedup::DedupConfig;
use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;
use crate::score::ScoringWeights;

/// Pipeline configuration. Every tunable is a plain value supplied at
/// construction time; `from_env` is a convenience for binaries.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upstream API key. Only needed when building a real `SearchClient`.
    pub api_key: String,

    // Fetching
    /// Hard ceiling on raw items fetched per run, regardless of multiplier.
    pub fetch_ceiling: usize,
    pub default_fetch_multiplier: u32,
    pub page_size: u32,
    pub max_concurrent_pages: usize,
    /// Deadline for each individual upstream call.
    pub call_timeout: Duration,
    pub retry: RetryPolicy,

    // Relevance
    pub dedup: DedupConfig,
    pub scoring: ScoringWeights,
    pub max_content_len: usize,
    pub min_relevance: f64,

    // Caching
    pub cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            fetch_ceiling: 100,
            default_fetch_multiplier: 3,
            page_size: 25,
            max_concurrent_pages: 4,
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            dedup: DedupConfig::default(),
            scoring: ScoringWeights::default(),
            max_content_len: 1000,
            min_relevance: 0.3,
            cache_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    /// `ADLENS_API_KEY` is required; the numeric overrides are optional.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reading through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("ADLENS_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "ADLENS_API_KEY environment variable is required".to_string(),
                )
            })?;

        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Some(secs) = parse_optional::<u64>(&lookup, "ADLENS_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(min) = parse_optional::<f64>(&lookup, "ADLENS_MIN_RELEVANCE")? {
            config.min_relevance = min;
        }
        if let Some(ceiling) = parse_optional::<usize>(&lookup, "ADLENS_FETCH_CEILING")? {
            config.fetch_ceiling = ceiling;
        }
        if let Some(secs) = parse_optional::<u64>(&lookup, "ADLENS_CALL_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_ceiling == 0 {
            return Err(config_error("fetch_ceiling must be greater than zero"));
        }
        if self.default_fetch_multiplier == 0 {
            return Err(config_error("default_fetch_multiplier must be at least 1"));
        }
        if self.page_size == 0 || self.max_concurrent_pages == 0 {
            return Err(config_error(
                "page_size and max_concurrent_pages must be greater than zero",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(config_error("call_timeout must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(config_error("min_relevance must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err(config_error("dedup.similarity_threshold must be within [0, 1]"));
        }
        if self.retry.max_attempts == 0 {
            return Err(config_error("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Build a client for one upstream using this config's key and deadline.
    pub fn search_client(&self, upstream: Upstream, base_url: &str) -> Result<SearchClient> {
        let client = SearchClient::new(upstream, base_url, self.api_key.clone())?
            .with_timeout(self.call_timeout)?;
        Ok(client)
    }

    /// Log the effective configuration without the API key.
    pub fn log_redacted(&self) {
        info!(
            api_key = if self.api_key.is_empty() { "<unset>" } else { "<redacted>" },
            fetch_ceiling = self.fetch_ceiling,
            default_fetch_multiplier = self.default_fetch_multiplier,
            page_size = self.page_size,
            max_concurrent_pages = self.max_concurrent_pages,
            call_timeout_secs = self.call_timeout.as_secs(),
            retry_max_attempts = self.retry.max_attempts,
            similarity_threshold = self.dedup.similarity_threshold,
            min_relevance = self.min_relevance,
            cache_ttl_secs = self.cache_ttl.as_secs(),
            "Pipeline config loaded"
        );
    }
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| config_error(&format!("{key} has an invalid value: {raw:?}"))),
    }
}

fn config_error(msg: &str) -> PipelineError {
    PipelineError::Configuration(msg.to_string())
}
