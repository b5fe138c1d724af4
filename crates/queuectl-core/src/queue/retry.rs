//! Retry policy: decides backoff delays.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::QueueError;

/// Upper bound on a single backoff delay (30 days).
const MAX_DELAY_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

/// Exponential backoff for failed tasks.
///
/// `delay = backoff_base ^ attempts` seconds, where `attempts` is the count
/// *after* the failing attempt was recorded. With base 2 the first retry waits
/// 2s, then 4s, 8s, ...
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    backoff_base: f64,
}

impl RetryPolicy {
    pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

    /// `backoff_base` must be a finite number greater than 1.
    pub fn new(backoff_base: f64) -> Result<Self, QueueError> {
        if !backoff_base.is_finite() || backoff_base <= 1.0 {
            return Err(QueueError::Config(format!(
                "backoff_base must be greater than 1, got {backoff_base}"
            )));
        }
        Ok(Self { backoff_base })
    }

    /// Delay before a record that has failed `attempts` times may run again.
    pub fn next_delay(&self, attempts: u32) -> TimeDelta {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.backoff_base.powi(exponent).min(MAX_DELAY_SECS);
        TimeDelta::milliseconds((secs * 1000.0).round() as i64)
    }

    /// Absolute deadline for the next attempt.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        now + self.next_delay(attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Self::DEFAULT_BACKOFF_BASE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::default();

        let d1 = policy.next_delay(1);
        let d2 = policy.next_delay(2);
        let d3 = policy.next_delay(3);

        assert!(d2 > d1);
        assert!(d3 > d2);

        assert_eq!(d1, TimeDelta::seconds(2));
        assert_eq!(d2, TimeDelta::seconds(4));
        assert_eq!(d3, TimeDelta::seconds(8));
    }

    #[test]
    fn fractional_base_is_supported() {
        let policy = RetryPolicy::new(1.5).unwrap();
        assert_eq!(policy.next_delay(1), TimeDelta::milliseconds(1500));
        assert_eq!(policy.next_delay(2), TimeDelta::milliseconds(2250));
    }

    #[test]
    fn deadline_is_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let policy = RetryPolicy::new(3.0).unwrap();
        assert_eq!(policy.next_attempt_at(now, 2), now + TimeDelta::seconds(9));
    }

    #[test]
    fn huge_attempt_counts_are_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(u32::MAX), TimeDelta::days(30));
    }

    #[rstest]
    #[case::one(1.0)]
    #[case::below_one(0.5)]
    #[case::negative(-2.0)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn rejects_non_growing_bases(#[case] base: f64) {
        assert!(matches!(RetryPolicy::new(base), Err(QueueError::Config(_))));
    }
}
