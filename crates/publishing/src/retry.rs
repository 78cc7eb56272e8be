//! Retry ceiling and exponential backoff.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default retry ceiling for a new job.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest delay a `chrono::Duration` can hold, in seconds.
pub const MAX_DELAY_SECS: i64 = i64::MAX / 1_000;

/// Backoff configuration.
///
/// The delay before attempt `n + 1` is `base^n` units, where `n` is the retry
/// count *after* the failing attempt was recorded: retry 1 waits 5 minutes,
/// retry 2 waits 25, retry 3 waits 125.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Exponential base.
    pub base: u32,
    /// Length of one backoff unit, in seconds.
    pub unit_secs: i64,
    /// Delay cap, in seconds. The default only guards the arithmetic, so the
    /// `base^n` ladder holds for every retry count that fits in a `Duration`.
    pub max_delay_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: 5,
            unit_secs: 60,
            max_delay_secs: MAX_DELAY_SECS,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt once `retry_count` failures were recorded.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::zero();
        }

        let cap = self.max_delay_secs.clamp(0, MAX_DELAY_SECS) as u64;
        let secs = u64::from(self.base)
            .checked_pow(retry_count)
            .and_then(|units| units.checked_mul(self.unit_secs.max(0) as u64))
            .map_or(cap, |secs| secs.min(cap));

        Duration::seconds(secs as i64)
    }

    /// Next attempt time for a job that now has `retry_count` recorded failures.
    pub fn next_attempt_at(&self, retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.delay_for_retry(retry_count))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether a job with `retry_count` recorded failures gets another attempt.
    pub fn should_retry(retry_count: u32, max_retries: u32) -> bool {
        retry_count < max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_ladder_is_five_to_the_n_minutes() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(0), Duration::zero());
        assert_eq!(policy.delay_for_retry(1), Duration::minutes(5));
        assert_eq!(policy.delay_for_retry(2), Duration::minutes(25));
        assert_eq!(policy.delay_for_retry(3), Duration::minutes(125));
    }

    #[test]
    fn long_retry_ceilings_keep_the_formula() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(7), Duration::minutes(78_125));
        assert_eq!(policy.delay_for_retry(12), Duration::minutes(244_140_625));
    }

    #[test]
    fn huge_retry_counts_saturate_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(u32::MAX), Duration::seconds(MAX_DELAY_SECS));
        assert_eq!(
            policy.next_attempt_at(u32::MAX, Utc::now()),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn an_explicit_cap_bounds_the_delay() {
        let policy = RetryPolicy {
            max_delay_secs: 3_600,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(2), Duration::minutes(25));
        assert_eq!(policy.delay_for_retry(3), Duration::hours(1));
    }

    #[test]
    fn should_retry_respects_ceiling() {
        assert!(RetryPolicy::should_retry(1, 3));
        assert!(RetryPolicy::should_retry(2, 3));
        assert!(!RetryPolicy::should_retry(3, 3));
        assert!(!RetryPolicy::should_retry(4, 3));
        assert!(!RetryPolicy::should_retry(0, 0));
    }

    proptest! {
        #[test]
        fn delay_matches_formula(n in 1u32..20) {
            let policy = RetryPolicy::default();
            prop_assert_eq!(policy.delay_for_retry(n), Duration::minutes(5_i64.pow(n)));
        }

        #[test]
        fn delay_never_decreases(n in 0u32..40) {
            let policy = RetryPolicy::default();
            prop_assert!(policy.delay_for_retry(n + 1) >= policy.delay_for_retry(n));
        }
    }
}
