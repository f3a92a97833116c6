pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod keywords;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod retry;
pub mod score;
pub mod service;
pub mod source;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::{CacheStats, ResultCache};
pub use config::PipelineConfig;
pub use dedup::{dedupe, jaccard_similarity, DedupConfig};
pub use error::{PipelineError, Result};
pub use fetcher::Fetcher;
pub use keywords::KeywordSet;
pub use normalize::{normalize, sanitize, truncate_on_word, ContentRecord, MediaKind, MediaRef};
pub use pipeline::{Pipeline, PipelineResult, PipelineStage, ProvenanceCounters, ResultStatus};
pub use query::Query;
pub use retry::{with_deadline, RetryPolicy};
pub use score::{RelevanceScorer, ScoringWeights};
pub use service::SearchService;
pub use source::SearchSource;

pub use search_client::{Platform, RawItem, SearchClient, SearchError, SearchRequest, Upstream};
