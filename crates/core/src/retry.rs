//! Bounded exponential backoff with jitter for collaborator calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::errors::Retryable;

const JITTER_MIN: f64 = 0.75;
const JITTER_MAX: f64 = 1.25;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self { max_attempts, initial_delay, ..Self::default() }
    }

    /// Research and drafting calls to the completion API.
    pub fn llm_analysis() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Starting a scraping actor run.
    pub fn scraper_start() -> Self {
        Self::new(2, Duration::from_secs(5))
    }

    pub fn email_send() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Un-jittered delay after the given 1-based attempt fails.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.base_delay(attempt).mul_f64(jitter)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the policy's
/// attempts are spent. The last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, op: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(policy, operation, |error: &E| error.is_retryable(), op).await
}

/// Like [`with_retry`] with a call-site classifier instead of [`Retryable`].
pub async fn with_retry_if<T, E, C, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: C,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    C: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_retryable(&error) => {
                let delay = policy.jittered_delay(attempt);
                warn!(
                    event_name = "retry.attempt_failed",
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
