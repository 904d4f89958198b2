//! Pure retry/backoff policy. The async loop that applies it lives in the
//! client crate.

use std::time::Duration;

use crate::outcome::FailureKind;

/// Delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1_000;
/// Upper bound for any single delay.
pub const MAX_DELAY_MS: u64 = 5_000;
/// Attempts per logical call unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay to wait before attempt `attempt_number` (1-based).
///
/// Attempt 1: immediate
/// Attempt 2: 1s
/// Attempt 3: 2s
/// Attempt 4: 4s
/// Attempt 5+: 5s
pub fn backoff_delay_ms(attempt_number: u32) -> u64 {
    if attempt_number <= 1 {
        return 0;
    }
    let exp = (attempt_number - 2).min(32);
    let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
    BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS)
}

/// [`backoff_delay_ms`] as a `Duration`.
pub fn backoff_delay(attempt_number: u32) -> Duration {
    Duration::from_millis(backoff_delay_ms(attempt_number))
}

/// What to do after attempt `attempt_number` failed with `kind`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then issue the next attempt.
    RetryAfter(Duration),
    /// Return the failure to the caller unchanged.
    GiveUp,
}

/// Whether attempt `attempt_number` failing with `kind` is followed by another attempt.
pub fn decide_retry(kind: FailureKind, attempt_number: u32, max_attempts: u32) -> RetryDecision {
    if !kind.is_transient() || attempt_number >= max_attempts {
        return RetryDecision::GiveUp;
    }
    RetryDecision::RetryAfter(backoff_delay(attempt_number + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay_ms(1), 0);
        assert_eq!(backoff_delay_ms(2), 1_000);
        assert_eq!(backoff_delay_ms(3), 2_000);
        assert_eq!(backoff_delay_ms(4), 4_000);
        assert_eq!(backoff_delay_ms(5), 5_000);
        assert_eq!(backoff_delay_ms(40), 5_000);
        assert_eq!(backoff_delay_ms(u32::MAX), 5_000);
    }

    #[test]
    fn terminal_kinds_give_up_immediately() {
        for kind in [
            FailureKind::HttpClientError(400),
            FailureKind::HttpClientError(404),
            FailureKind::Unauthorized,
            FailureKind::MalformedResponse,
        ] {
            assert_eq!(decide_retry(kind, 1, 3), RetryDecision::GiveUp, "{kind}");
        }
    }

    #[test]
    fn transient_kinds_retry_until_budget_is_spent() {
        let kind = FailureKind::HttpServerError(503);
        assert_eq!(
            decide_retry(kind, 1, 3),
            RetryDecision::RetryAfter(Duration::from_millis(1_000))
        );
        assert_eq!(
            decide_retry(kind, 2, 3),
            RetryDecision::RetryAfter(Duration::from_millis(2_000))
        );
        assert_eq!(decide_retry(kind, 3, 3), RetryDecision::GiveUp);
        assert!(matches!(
            decide_retry(FailureKind::HttpClientError(408), 1, 3),
            RetryDecision::RetryAfter(_)
        ));
    }
}
