// Seam between the pipeline and whatever answers search requests.
//
// Production uses `search_client::SearchClient`; tests use
// `testing::MockSource`. Implementations make exactly one upstream call per
// `fetch_page` and never retry.

use async_trait::async_trait;
use search_client::{RawItem, SearchClient, SearchError, SearchRequest};

#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch one page of raw items.
    async fn fetch_page(&self, request: &SearchRequest) -> Result<Vec<RawItem>, SearchError>;
}

#[async_trait]
impl SearchSource for SearchClient {
    async fn fetch_page(&self, request: &SearchRequest) -> Result<Vec<RawItem>, SearchError> {
        self.search(request).await
    }
}
