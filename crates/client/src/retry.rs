//! Bounded retry loop over attempts.

use std::future::Future;

use powerctl_core::backoff::{decide_retry, RetryDecision, DEFAULT_MAX_ATTEMPTS};
use powerctl_core::Outcome;

/// How many times a logical call may be attempted. Which failures are retried
/// and how long to wait comes from [`powerctl_core::backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Single attempt, no retry.
    pub fn once() -> Self {
        Self::new(1)
    }

    /// Attempts per call, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calls `attempt` (with the 1-based attempt number) until it succeeds,
    /// fails terminally, or the budget runs out. The last failure is returned
    /// unchanged. Backoff is an async sleep; callers must not hold locks
    /// across this call.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Outcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let mut attempt_number = 1;
        loop {
            let failure = match attempt(attempt_number).await {
                Ok(value) => {
                    if attempt_number > 1 {
                        tracing::info!(label, attempt = attempt_number, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            match decide_retry(failure.kind, attempt_number, self.max_attempts) {
                RetryDecision::GiveUp => {
                    if failure.is_transient() {
                        tracing::warn!(label, attempts = attempt_number, error = %failure, "giving up");
                    }
                    return Err(failure);
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        label,
                        attempt = attempt_number,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_number += 1;
                }
            }
        }
    }
}

/// `RetryPolicy::new(max_attempts).run(..)` without a label.
pub async fn with_retry<T, F, Fut>(attempt: F, max_attempts: u32) -> Outcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    RetryPolicy::new(max_attempts).run("call", attempt).await
}
