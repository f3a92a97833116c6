use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt, TryStreamExt};
use search_client::{RawItem, SearchError, SearchRequest};
use tracing::info;

use crate::config::PipelineConfig;
use crate::query::Query;
use crate::retry::{with_deadline, RetryPolicy};
use crate::source::SearchSource;

/// Pages a query through a `SearchSource`.
///
/// `fetch_once` is a single time-boxed call with no retry. `fetch` splits the
/// target into offset pages, runs each page under the retry policy with
/// bounded concurrency, and concatenates the pages in offset order.
pub struct Fetcher {
    source: Arc<dyn SearchSource>,
    retry: RetryPolicy,
    call_timeout: Duration,
    page_size: u32,
    max_concurrent_pages: usize,
}

impl Fetcher {
    pub fn new(source: Arc<dyn SearchSource>, config: &PipelineConfig) -> Self {
        Self {
            source,
            retry: config.retry,
            call_timeout: config.call_timeout,
            page_size: config.page_size.max(1),
            max_concurrent_pages: config.max_concurrent_pages.max(1),
        }
    }

    pub async fn fetch_once(&self, request: &SearchRequest) -> Result<Vec<RawItem>, SearchError> {
        with_deadline(self.call_timeout, self.source.fetch_page(request)).await
    }

    /// Fetch up to `target` raw items for `query`.
    pub async fn fetch(&self, query: &Query, target: usize) -> Result<Vec<RawItem>, SearchError> {
        if target == 0 {
            return Ok(Vec::new());
        }
        let requests = page_requests(query, target, self.page_size as usize);
        let pages = requests.len();

        let results: Vec<Vec<RawItem>> = stream::iter(requests)
            .map(|request| async move {
                self.retry
                    .run("search_page", || self.fetch_once(&request))
                    .await
            })
            .buffered(self.max_concurrent_pages)
            .try_collect()
            .await?;

        let mut items: Vec<RawItem> = results.into_iter().flatten().collect();
        items.truncate(target);
        info!(query = %query.text, target, pages, fetched = items.len(), "Fetched raw items");
        Ok(items)
    }
}

/// Offset pages covering `target` items; the last page is trimmed to fit.
fn page_requests(query: &Query, target: usize, page_size: usize) -> Vec<SearchRequest> {
    let page_size = page_size.min(target).max(1);
    (0..target.div_ceil(page_size))
        .map(|page| {
            let offset = page * page_size;
            let limit = page_size.min(target - offset);
            query.page_request(offset as u32, limit as u32)
        })
        .collect()
}
