// The orchestrator: fetch -> dedupe -> normalize -> score/filter -> rank.
//
// Stages run strictly in sequence. An empty fetch or an empty relevance pool
// still completes with a normal result whose status says why it is empty.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::dedup::dedupe;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::keywords::KeywordSet;
use crate::normalize::{normalize, ContentRecord};
use crate::query::Query;
use crate::score::RelevanceScorer;
use crate::source::SearchSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Fetching,
    Deduping,
    Scoring,
    Ranking,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    /// Upstream returned nothing at all.
    NothingFetched,
    /// Items were fetched but none survived relevance filtering.
    NoRelevantResults,
}

/// Item counts observed at each stage boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceCounters {
    pub fetched: usize,
    pub after_dedup: usize,
    pub after_filter: usize,
    pub returned: usize,
}

/// Ranked, size-bounded output handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub items: Vec<ContentRecord>,
    pub counters: ProvenanceCounters,
    pub status: ResultStatus,
    pub generated_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct StageTracker<'a> {
    query: &'a str,
    stage: PipelineStage,
}

impl StageTracker<'_> {
    fn advance(&mut self, next: PipelineStage) {
        debug!(query = self.query, from = ?self.stage, to = ?next, "Pipeline stage");
        self.stage = next;
    }
}

pub struct Pipeline {
    fetcher: Fetcher,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(source: Arc<dyn SearchSource>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fetcher: Fetcher::new(source, &config),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one uncached pipeline pass for `query`.
    pub async fn run(&self, query: &Query) -> Result<PipelineResult> {
        query.validate()?;
        let mut tracker = StageTracker {
            query: &query.text,
            stage: PipelineStage::Idle,
        };
        let mut counters = ProvenanceCounters::default();

        let target = query.fetch_target(
            self.config.default_fetch_multiplier,
            self.config.fetch_ceiling,
        );
        tracker.advance(PipelineStage::Fetching);
        let raw = match self.fetcher.fetch(query, target).await {
            Ok(raw) => raw,
            Err(e) => {
                tracker.advance(PipelineStage::Failed);
                warn!(query = %query.text, error = %e, "Pipeline fetch failed");
                return Err(e.into());
            }
        };
        counters.fetched = raw.len();

        tracker.advance(PipelineStage::Deduping);
        let unique = dedupe(raw, &self.config.dedup);
        counters.after_dedup = unique.len();

        tracker.advance(PipelineStage::Scoring);
        let keywords = KeywordSet::from_query(&query.text);
        if keywords.is_empty() {
            debug!(query = %query.text, "No usable keywords, treating every item as relevant");
        }
        let scorer = RelevanceScorer::new(&keywords, self.config.scoring);
        let min_relevance = query.min_relevance.unwrap_or(self.config.min_relevance);
        let mut candidates: Vec<ContentRecord> = unique
            .iter()
            .map(|item| normalize(item, self.config.max_content_len))
            .filter(|record| !query.active_only || record.is_active)
            .filter_map(|mut record| {
                let score = scorer.score(&record);
                (score >= min_relevance).then(|| {
                    record.relevance = Some(score);
                    record
                })
            })
            .collect();
        counters.after_filter = candidates.len();

        tracker.advance(PipelineStage::Ranking);
        // Stable sort: equal scores keep fetch order.
        candidates.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(query.count);
        counters.returned = candidates.len();

        let status = if counters.fetched == 0 {
            ResultStatus::NothingFetched
        } else if candidates.is_empty() {
            ResultStatus::NoRelevantResults
        } else {
            ResultStatus::Ok
        };
        tracker.advance(PipelineStage::Done);
        info!(
            query = %query.text,
            fetched = counters.fetched,
            after_dedup = counters.after_dedup,
            after_filter = counters.after_filter,
            returned = counters.returned,
            status = ?status,
            "Pipeline complete"
        );

        Ok(PipelineResult {
            items: candidates,
            counters,
            status,
            generated_at: Utc::now(),
        })
    }
}
