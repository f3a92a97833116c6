//! TTL result cache with single-flight request coalescing.
//!
//! One mutex guards both the cache entries and the in-flight map, so
//! check-cache, join-or-register and settle are each atomic per key. A real
//! computation runs in its own task: callers that stop waiting do not cancel
//! it, and it always removes its in-flight entry when it settles, writing the
//! cache first on success.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineResult;

/// Above this many stored entries, expired ones are pruned on the next insert.
const MAX_CACHE_ENTRIES: usize = 500;

type SharedRun = Shared<BoxFuture<'static, Result<Arc<PipelineResult>>>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Arc<PipelineResult>,
    created_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, SharedRun>,
    hits: u64,
    misses: u64,
    coalesced: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined a computation already in flight.
    pub coalesced: u64,
    /// Entries still within their TTL.
    pub entries: usize,
    pub in_flight: usize,
}

pub struct ResultCache {
    ttl: Duration,
    max_entries: usize,
    state: Arc<Mutex<CacheState>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: MAX_CACHE_ENTRIES,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Entry count that triggers pruning of expired entries on insert.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Return the cached result for `key`, join the computation already
    /// running for it, or start `compute` as the one real computation.
    /// Every waiter of a computation receives the same result or error.
    pub async fn get_or_run<F, Fut>(&self, key: String, compute: F) -> Result<Arc<PipelineResult>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PipelineResult>> + Send + 'static,
    {
        let run = {
            let mut state = self.state.lock().await;

            let cached = state
                .entries
                .get(&key)
                .map(|entry| (entry.created_at.elapsed() < self.ttl, Arc::clone(&entry.result)));
            match cached {
                Some((true, result)) => {
                    state.hits += 1;
                    debug!(key = %key, "Result cache hit");
                    return Ok(result);
                }
                Some((false, _)) => {
                    state.entries.remove(&key);
                }
                None => {}
            }

            if let Some(run) = state.in_flight.get(&key).cloned() {
                state.coalesced += 1;
                debug!(key = %key, "Joining in-flight computation");
                run
            } else {
                state.misses += 1;
                let run = self.spawn_computation(key.clone(), compute());
                state.in_flight.insert(key, run.clone());
                run
            }
        };
        run.await
    }

    fn spawn_computation<Fut>(&self, key: String, computation: Fut) -> SharedRun
    where
        Fut: Future<Output = Result<PipelineResult>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let (ttl, max_entries) = (self.ttl, self.max_entries);
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(computation).catch_unwind().await {
                Ok(outcome) => outcome.map(Arc::new),
                Err(_) => Err(PipelineError::Internal("pipeline computation panicked".into())),
            };

            let mut state = state.lock().await;
            if let Ok(result) = &outcome {
                if state.entries.len() >= max_entries {
                    state.entries.retain(|_, e| e.created_at.elapsed() < ttl);
                }
                state.entries.insert(
                    key.clone(),
                    CacheEntry {
                        result: Arc::clone(result),
                        created_at: Instant::now(),
                    },
                );
            }
            state.in_flight.remove(&key);
            outcome
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(PipelineError::Internal(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
            entries: state
                .entries
                .values()
                .filter(|e| e.created_at.elapsed() < self.ttl)
                .count(),
            in_flight: state.in_flight.len(),
        }
    }
}
