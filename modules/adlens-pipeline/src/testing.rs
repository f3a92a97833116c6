// Test doubles for the pipeline.
//
// - MockSource (SearchSource): serves a fixed corpus by offset and limit,
//   with a script of failures and stalls consumed one per call
// - item helpers for building raw items the way upstream payloads look
// - init_tracing for readable logs under `cargo test`

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use search_client::{parse_items, RawItem, SearchError, SearchRequest, Upstream};
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::source::SearchSource;

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

enum Step {
    Fail(SearchError),
    /// Sleep, then serve the corpus as usual.
    Stall(Duration),
}

/// In-memory search source. Each call consumes the next scripted step, if
/// any; once the script is exhausted every call serves
/// `corpus[offset..offset + limit]`.
/// Builder pattern: `.with_items()`, `.then_fail()`, `.then_stall()`,
/// `.with_latency()`, `.with_page_latency()`.
pub struct MockSource {
    corpus: Vec<RawItem>,
    script: Mutex<VecDeque<Step>>,
    latency: Option<Duration>,
    page_latency: HashMap<u32, Duration>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            corpus: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            latency: None,
            page_latency: HashMap::new(),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_items(mut self, items: Vec<RawItem>) -> Self {
        self.corpus = items;
        self
    }

    /// Fail the next unscripted call with `err`.
    pub fn then_fail(self, err: SearchError) -> Self {
        self.push_step(Step::Fail(err));
        self
    }

    /// Delay the next unscripted call by `delay` before answering.
    pub fn then_stall(self, delay: Duration) -> Self {
        self.push_step(Step::Stall(delay));
        self
    }

    /// Add `latency` to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add `latency` to every call for the page starting at `offset`.
    pub fn with_page_latency(mut self, offset: u32, latency: Duration) -> Self {
        self.page_latency.insert(offset, latency);
        self
    }

    fn push_step(&self, step: Step) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    /// Number of `fetch_page` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// When each call arrived, in arrival order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Gaps between consecutive calls.
    pub fn call_gaps(&self) -> Vec<Duration> {
        self.call_times()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SearchSource for MockSource {
    async fn fetch_page(&self, request: &SearchRequest) -> Result<Vec<RawItem>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Instant::now());
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(latency) = self.page_latency.get(&request.offset) {
            tokio::time::sleep(*latency).await;
        }
        match step {
            Some(Step::Fail(err)) => return Err(err),
            Some(Step::Stall(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        let start = (request.offset as usize).min(self.corpus.len());
        let end = start
            .saturating_add(request.limit as usize)
            .min(self.corpus.len());
        Ok(self.corpus[start..end].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Item helpers
// ---------------------------------------------------------------------------

/// An ad-library item with a title and body.
pub fn ad(id: &str, title: &str, body: &str) -> RawItem {
    ad_from(json!({
        "ad_archive_id": id,
        "page_name": "Test Page",
        "is_active": true,
        "snapshot": {
            "title": title,
            "body": {"text": body}
        }
    }))
}

/// An ad-library item marked inactive.
pub fn inactive_ad(id: &str, title: &str, body: &str) -> RawItem {
    ad_from(json!({
        "ad_archive_id": id,
        "is_active": false,
        "snapshot": {
            "title": title,
            "body": {"text": body}
        }
    }))
}

/// An ad-library item parsed from an arbitrary JSON entry.
pub fn ad_from(entry: Value) -> RawItem {
    parse_items(Upstream::AdLibrary, json!([entry]))
        .ok()
        .and_then(|mut items| items.pop())
        .unwrap_or(RawItem::Unknown(Value::Null))
}

pub fn rate_limited(retry_after: Option<Duration>) -> SearchError {
    SearchError::RateLimited { retry_after }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Route `tracing` output through the test harness. Safe to call from every
/// test; only the first call installs the subscriber.
#[cfg(feature = "test-support")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("adlens_pipeline=debug")),
        )
        .with_test_writer()
        .try_init();
}
