use search_client::{Platform, SearchRequest};
use serde::Serialize;
use sha2::{Digest, Sha256};
use typed_builder::TypedBuilder;

use crate::error::{PipelineError, Result};

/// An immutable search request from a caller.
///
/// ```
/// use adlens_pipeline::Query;
///
/// let query = Query::builder().text("wireless earbuds").count(5).build();
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Query {
    #[builder(setter(into))]
    pub text: String,
    /// Country or region code forwarded upstream, e.g. `"US"`.
    #[builder(default, setter(into, strip_option))]
    pub locale: Option<String>,
    #[builder(default)]
    pub platforms: Vec<Platform>,
    /// Number of ranked items the caller wants back.
    #[builder(default = 10)]
    pub count: usize,
    /// Over-fetch factor; the config default applies when unset.
    #[builder(default, setter(strip_option))]
    pub fetch_multiplier: Option<u32>,
    /// Relevance threshold override; the config value applies when unset.
    #[builder(default, setter(strip_option))]
    pub min_relevance: Option<f64>,
    #[builder(default)]
    pub active_only: bool,
}

#[derive(Serialize)]
struct KeyParts<'a> {
    text: String,
    locale: Option<String>,
    platforms: Vec<&'a str>,
    count: usize,
    fetch_multiplier: Option<u32>,
    min_relevance: Option<u64>,
    active_only: bool,
}

impl Query {
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("query text is empty".into()));
        }
        if self.count == 0 {
            return Err(PipelineError::InvalidQuery(
                "requested count must be greater than zero".into(),
            ));
        }
        if self.fetch_multiplier == Some(0) {
            return Err(PipelineError::InvalidQuery(
                "fetch multiplier must be at least 1".into(),
            ));
        }
        if let Some(min) = self.min_relevance {
            if !(0.0..=1.0).contains(&min) {
                return Err(PipelineError::InvalidQuery(format!(
                    "relevance threshold {min} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Stable cache key. Queries that differ only in case, surrounding
    /// whitespace or platform order share a key.
    pub fn cache_key(&self) -> String {
        let mut platforms: Vec<&str> = self.platforms.iter().map(Platform::as_str).collect();
        platforms.sort_unstable();
        platforms.dedup();

        let parts = KeyParts {
            text: self
                .text
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            locale: self.locale.as_ref().map(|l| l.trim().to_uppercase()),
            platforms,
            count: self.count,
            fetch_multiplier: self.fetch_multiplier,
            min_relevance: self.min_relevance.map(f64::to_bits),
            active_only: self.active_only,
        };
        let bytes = serde_json::to_vec(&parts).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Raw items to fetch: `count * multiplier`, never above `ceiling`.
    pub fn fetch_target(&self, default_multiplier: u32, ceiling: usize) -> usize {
        let multiplier = self.fetch_multiplier.unwrap_or(default_multiplier).max(1) as usize;
        self.count.saturating_mul(multiplier).min(ceiling)
    }

    /// Upstream request for one page of this query.
    pub(crate) fn page_request(&self, offset: u32, limit: u32) -> SearchRequest {
        SearchRequest {
            query: self.text.trim().to_string(),
            locale: self.locale.clone(),
            platforms: self.platforms.clone(),
            active_only: self.active_only,
            offset,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_count_and_multiplier() {
        let q = Query::builder().text("earbuds").count(0).build();
        assert!(matches!(q.validate(), Err(PipelineError::InvalidQuery(_))));

        let q = Query::builder().text("earbuds").fetch_multiplier(0).build();
        assert!(matches!(q.validate(), Err(PipelineError::InvalidQuery(_))));

        let q = Query::builder().text("   ").build();
        assert!(q.validate().is_err());
    }

    #[test]
    fn fetch_target_is_capped() {
        let q = Query::builder().text("earbuds").count(5).fetch_multiplier(3).build();
        assert_eq!(q.fetch_target(2, 100), 15);
        assert_eq!(q.fetch_target(2, 10), 10);

        let q = Query::builder().text("earbuds").count(5).build();
        assert_eq!(q.fetch_target(2, 100), 10);
    }

    #[test]
    fn cache_key_normalizes_text_and_platforms() {
        let a = Query::builder()
            .text("Wireless  Earbuds ")
            .platforms(vec![Platform::Instagram, Platform::Facebook])
            .build();
        let b = Query::builder()
            .text("wireless earbuds")
            .platforms(vec![Platform::Facebook, Platform::Instagram])
            .build();
        assert_eq!(a.cache_key(), b.cache_key());

        let c = Query::builder().text("wireless earbuds").count(20).build();
        assert_ne!(b.cache_key(), c.cache_key());
    }
}
