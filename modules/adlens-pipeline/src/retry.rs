use std::future::Future;
use std::time::Duration;

use search_client::SearchError;
use tracing::warn;

/// Bounded retry with exponential backoff.
///
/// Delay before the retry that follows failed attempt `n` (1-based) is
/// `min(initial_backoff * 2^(n-1), backoff_cap)`, raised to the server's
/// `Retry-After` hint when one was sent. Errors that are not retryable
/// propagate immediately without consuming an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total calls, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential component of the delay after failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_cap)
    }

    /// Full delay after failed attempt `attempt`, honoring any server hint.
    pub fn delay_for(&self, attempt: u32, err: &SearchError) -> Duration {
        let backoff = self.backoff(attempt);
        match err.retry_after() {
            Some(server) => server.max(backoff),
            None => backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, SearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upstream call failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(operation, attempts = attempt, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Time-box a single upstream call. On expiry the call's future is dropped,
/// which cancels it, and a `Timeout` carrying the deadline is returned.
pub async fn with_deadline<T, Fut>(deadline: Duration, call: Fut) -> Result<T, SearchError>
where
    Fut: Future<Output = Result<T, SearchError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(Err(SearchError::Timeout(d))) if d.is_zero() => Err(SearchError::Timeout(deadline)),
        Ok(result) => result,
        Err(_) => Err(SearchError::Timeout(deadline)),
    }
}
