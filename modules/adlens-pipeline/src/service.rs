use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheStats, ResultCache};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineResult};
use crate::query::Query;
use crate::source::SearchSource;

/// Public entry point: the pipeline behind a TTL cache with single-flight
/// coalescing. Identical queries within the TTL share one result, and
/// concurrent identical queries share one computation.
pub struct SearchService {
    pipeline: Arc<Pipeline>,
    cache: ResultCache,
}

impl SearchService {
    pub fn new(source: Arc<dyn SearchSource>, config: PipelineConfig) -> Result<Self> {
        let cache = ResultCache::new(config.cache_ttl);
        let pipeline = Arc::new(Pipeline::new(source, config)?);
        Ok(Self { pipeline, cache })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Validate `query`, then return its cached result or compute it.
    /// Invalid queries fail before any cache or upstream access.
    pub async fn run_pipeline(&self, query: &Query) -> Result<Arc<PipelineResult>> {
        query.validate()?;
        let key = query.cache_key();
        debug!(query = %query.text, key = %key, "Running pipeline");

        let pipeline = Arc::clone(&self.pipeline);
        let query = query.clone();
        self.cache
            .get_or_run(key, move || async move { pipeline.run(&query).await })
            .await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}
