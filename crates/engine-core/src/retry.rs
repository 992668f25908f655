use crate::error::RetryError;
use crate::metrics::Metrics;
use model::retry::{Decision, DecisionOracle};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Indicates whether an error should be retried or treated as fatal,
/// independent of which [`RetryMode`] is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// C1's two operating modes (§4.1). Fixed computes its own backoff; Advisory
/// defers the wait and the retry/stop call itself to an external oracle,
/// falling back to [`Decision::conservative_fallback`] on timeout or error.
#[derive(Clone)]
pub enum RetryMode {
    Fixed,
    Advisory {
        oracle: Arc<dyn DecisionOracleDyn>,
        oracle_timeout: Duration,
    },
}

/// Object-safe wrapper so `RetryMode::Advisory` can hold any [`DecisionOracle`]
/// implementation behind a trait object regardless of its associated error type.
#[async_trait::async_trait]
pub trait DecisionOracleDyn: Send + Sync {
    async fn decide(&self, failure_kind: &str, attempt: u32) -> Option<Decision>;
}

#[async_trait::async_trait]
impl<T> DecisionOracleDyn for T
where
    T: DecisionOracle,
{
    async fn decide(&self, failure_kind: &str, attempt: u32) -> Option<Decision> {
        DecisionOracle::decide(self, failure_kind, attempt).await.ok()
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    pub mode: RetryMode,
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay to randomize, in `[0, 1]` (§4.1
    /// "exponential backoff with jitter").
    pub jitter_fraction: f64,
    decision_cache: Arc<Mutex<HashMap<String, Decision>>>,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            mode: RetryMode::Fixed,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() { base_delay } else { max_delay },
            jitter_fraction: 0.2,
            decision_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn advisory(
        max_attempts: usize,
        oracle: Arc<dyn DecisionOracleDyn>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            mode: RetryMode::Advisory { oracle, oracle_timeout },
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.2,
            decision_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Executes `op`, retrying failures `classify` marks [`RetryDisposition::Retry`]
    /// up to `max_attempts`, reporting outcomes on `metrics`.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        failure_kind: &str,
        metrics: &Metrics,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if classify(&err) == RetryDisposition::Stop {
                        return Err(RetryError::Fatal(err.to_string()));
                    }

                    // In Advisory mode the oracle's own verdict gates the
                    // retry; `classify` above only catches what the caller
                    // itself knows is unconditionally fatal. Fixed mode has
                    // no oracle and relies on `classify` alone (§4.1).
                    let delay = match &self.mode {
                        RetryMode::Fixed => self.backoff_delay(attempt),
                        RetryMode::Advisory { oracle, oracle_timeout } => {
                            let decision = self.advisory_decision(failure_kind, attempt, oracle, *oracle_timeout).await;
                            if !decision.should_retry {
                                return Err(RetryError::Fatal(err.to_string()));
                            }
                            Duration::from_secs(decision.suggested_wait_seconds)
                        }
                    };

                    if attempt as usize + 1 >= self.max_attempts {
                        return Err(RetryError::AttemptsExceeded {
                            attempts: attempt as usize + 1,
                            last_error: err.to_string(),
                        });
                    }

                    metrics.record_retry();
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn advisory_decision(
        &self,
        failure_kind: &str,
        attempt: u32,
        oracle: &Arc<dyn DecisionOracleDyn>,
        timeout: Duration,
    ) -> Decision {
        let cache_key = cache_key(failure_kind);
        if let Some(cached) = self.decision_cache.lock().get(&cache_key).cloned() {
            return cached;
        }

        let decision = match tokio::time::timeout(timeout, oracle.decide(failure_kind, attempt)).await {
            Ok(Some(decision)) => decision,
            Ok(None) | Err(_) => Decision::conservative_fallback(),
        };

        self.decision_cache.lock().insert(cache_key, decision.clone());
        decision
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor).min(self.max_delay.as_millis());

        let jitter_span = (delay_ms as f64 * self.jitter_fraction) as i128;
        let jittered = if jitter_span > 0 {
            let offset = rand::rng().random_range(-jitter_span..=jitter_span);
            (delay_ms as i128 + offset).max(0) as u128
        } else {
            delay_ms
        };

        Duration::from_millis(jittered.min(self.max_delay.as_millis()) as u64)
    }
}

/// The oracle's cache key is the failure classification alone, not the
/// attempt count, so repeated failures of the same kind reuse one decision
/// within the policy's lifetime (§4.1 "decision caching").
fn cache_key(failure_kind: &str) -> String {
    blake3::hash(failure_kind.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct TestError(&'static str);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[tokio::test]
    async fn fixed_mode_retries_transient_failure_and_succeeds() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(0), Duration::from_millis(0));
        let metrics = Metrics::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = attempts.clone();

        let result = policy
            .run(
                "transient",
                &metrics,
                move || {
                    let op_attempts = op_attempts.clone();
                    async move {
                        let attempt = op_attempts.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            Err(TestError("transient"))
                        } else {
                            Ok::<&'static str, TestError>("done")
                        }
                    }
                },
                |_err: &TestError| RetryDisposition::Retry,
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().retry_count, 2);
    }

    #[tokio::test]
    async fn fixed_mode_exhausts_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(0), Duration::from_millis(0));
        let metrics = Metrics::new();

        let result: Result<(), RetryError> = policy
            .run(
                "permanent",
                &metrics,
                || async { Err::<(), TestError>(TestError("permanent")) },
                |_err: &TestError| RetryDisposition::Retry,
            )
            .await;

        assert!(matches!(result, Err(RetryError::AttemptsExceeded { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn fatal_classification_stops_immediately() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(0), Duration::from_millis(0));
        let metrics = Metrics::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = attempts.clone();

        let result: Result<(), RetryError> = policy
            .run(
                "malformed",
                &metrics,
                move || {
                    let op_attempts = op_attempts.clone();
                    async move {
                        op_attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), TestError>(TestError("malformed"))
                    }
                },
                |_err: &TestError| RetryDisposition::Stop,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().retry_count, 0);
    }

    struct FlakyOracle {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl DecisionOracle for FlakyOracle {
        type Error = std::convert::Infallible;

        async fn decide(&self, _failure_kind: &str, _attempt: u32) -> Result<Decision, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Decision::new(true, 1, 0.9, None).unwrap())
        }
    }

    #[tokio::test]
    async fn advisory_mode_caches_decision_across_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(FlakyOracle { calls: calls.clone(), delay: Duration::from_millis(0) });
        let policy = RetryPolicy::advisory(5, oracle, Duration::from_secs(1));
        let metrics = Metrics::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = attempts.clone();

        let result = policy
            .run(
                "same_kind",
                &metrics,
                move || {
                    let op_attempts = op_attempts.clone();
                    async move {
                        let attempt = op_attempts.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            Err(TestError("same_kind"))
                        } else {
                            Ok::<&'static str, TestError>("done")
                        }
                    }
                },
                |_err: &TestError| RetryDisposition::Retry,
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "decision should be cached after first lookup");
    }

    /// The oracle times out on every call, so `advisory_decision` falls back
    /// to [`Decision::conservative_fallback`], whose `should_retry` is
    /// `false` — the engine must stop after the first attempt rather than
    /// grinding through `max_attempts` on a verdict that said not to.
    #[tokio::test]
    async fn advisory_mode_stops_on_conservative_fallback_from_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(FlakyOracle { calls, delay: Duration::from_millis(50) });
        let policy = RetryPolicy::advisory(3, oracle, Duration::from_millis(1));
        let metrics = Metrics::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = attempts.clone();

        let result: Result<(), RetryError> = policy
            .run(
                "slow_oracle",
                &metrics,
                move || {
                    let op_attempts = op_attempts.clone();
                    async move {
                        op_attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), TestError>(TestError("slow_oracle"))
                    }
                },
                |_err: &TestError| RetryDisposition::Retry,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "should_retry: false must stop after one attempt");
    }

    /// A `should_retry: true` advisory decision does gate further attempts,
    /// distinguishing this from `classify` alone stopping retries.
    #[tokio::test]
    async fn advisory_mode_retries_when_oracle_says_so() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(FlakyOracle { calls: calls.clone(), delay: Duration::from_millis(0) });
        let policy = RetryPolicy::advisory(3, oracle, Duration::from_secs(1));
        let metrics = Metrics::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let op_attempts = attempts.clone();

        let result: Result<(), RetryError> = policy
            .run(
                "retryable",
                &metrics,
                move || {
                    let op_attempts = op_attempts.clone();
                    async move {
                        op_attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), TestError>(TestError("retryable"))
                    }
                },
                |_err: &TestError| RetryDisposition::Retry,
            )
            .await;

        assert!(matches!(result, Err(RetryError::AttemptsExceeded { attempts: 3, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
