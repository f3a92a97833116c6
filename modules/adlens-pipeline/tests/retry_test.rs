//! Retry and deadline behavior observed through the upstream call log.
//! Every test runs on paused time, so backoff sleeps complete instantly
//! while call timestamps still reflect the scheduled delays.

use std::sync::Arc;
use std::time::Duration;

use adlens_pipeline::testing::{ad, rate_limited, MockSource};
use adlens_pipeline::{
    Pipeline, PipelineConfig, PipelineError, Query, RetryPolicy, SearchError,
};

fn items() -> Vec<adlens_pipeline::RawItem> {
    vec![
        ad("w1", "Wireless Earbuds", "Lightweight wireless earbuds for runners"),
        ad("w2", "Studio Earbuds", "Reference tuned earbuds for mixing on the go"),
    ]
}

fn config(retry: RetryPolicy) -> PipelineConfig {
    PipelineConfig {
        retry,
        call_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

fn query() -> Query {
    Query::builder().text("wireless earbuds").count(5).build()
}

fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(50),
        "expected about {expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_delays_next_attempt() {
    let source = Arc::new(
        MockSource::new()
            .with_items(items())
            .then_fail(rate_limited(Some(Duration::from_secs(2)))),
    );
    let pipeline = Pipeline::new(source.clone(), config(RetryPolicy::default())).unwrap();

    let result = pipeline.run(&query()).await.unwrap();

    assert_eq!(result.counters.fetched, 2);
    assert_eq!(source.calls(), 2);
    assert!(source.call_gaps()[0] >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_and_stops_at_cap() {
    let source = Arc::new(
        MockSource::new()
            .with_items(items())
            .then_fail(rate_limited(None))
            .then_fail(rate_limited(None))
            .then_fail(rate_limited(None)),
    );
    let retry = RetryPolicy {
        max_attempts: 4,
        initial_backoff: Duration::from_secs(1),
        backoff_cap: Duration::from_secs(3),
    };
    let pipeline = Pipeline::new(source.clone(), config(retry)).unwrap();

    pipeline.run(&query()).await.unwrap();

    let gaps = source.call_gaps();
    assert_eq!(gaps.len(), 3);
    assert_close(gaps[0], Duration::from_secs(1));
    assert_close(gaps[1], Duration::from_secs(2));
    assert_close(gaps[2], Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_last_error() {
    let source = Arc::new(
        MockSource::new()
            .with_items(items())
            .then_fail(rate_limited(None))
            .then_fail(SearchError::Network("connection reset".into()))
            .then_fail(SearchError::Api {
                status: 503,
                message: "unavailable".into(),
                body: None,
            }),
    );
    let pipeline = Pipeline::new(source.clone(), config(RetryPolicy::default())).unwrap();

    let err = pipeline.run(&query()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Search(SearchError::Api { status: 503, .. })
    ));
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_call_times_out_and_is_retried() {
    let source = Arc::new(
        MockSource::new()
            .with_items(items())
            .then_stall(Duration::from_secs(60)),
    );
    let pipeline = Pipeline::new(source.clone(), config(RetryPolicy::default())).unwrap();

    let result = pipeline.run(&query()).await.unwrap();

    assert_eq!(result.counters.fetched, 2);
    assert_eq!(source.calls(), 2);
    // 5s deadline, then the 1s initial backoff.
    assert_close(source.call_gaps()[0], Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn every_attempt_timing_out_reports_the_deadline() {
    let source = Arc::new(MockSource::new().with_latency(Duration::from_secs(60)));
    let pipeline = Pipeline::new(source.clone(), config(RetryPolicy::default())).unwrap();

    let err = pipeline.run(&query()).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(
        err,
        PipelineError::Search(SearchError::Timeout(d)) if d == Duration::from_secs(5)
    ));
    assert_eq!(source.calls(), 3);
}
