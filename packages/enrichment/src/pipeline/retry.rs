//! Backoff policy for backend calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after this delay.
    Retry(Duration),
    /// Attempt budget exhausted.
    GiveUp,
}

/// Exponential backoff policy.
///
/// delay = base_delay * factor ^ (attempt - 1) * jitter, capped at max_delay.
/// Jitter is within +/-10% and seeded from a caller key (the posting
/// fingerprint) so delays are reproducible per posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// A policy that never sleeps. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 0,
            factor: 1.0,
            max_delay_ms: 0,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based)
    /// just failed.
    pub fn delay_for(&self, attempt: u32, key: &str) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.base_delay_ms as f64 * self.factor.powi(exponent);

        let jitter_seed = key.chars().map(|c| c as u32).fold(attempt, u32::wrapping_add);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0);

        let delay_ms = (raw * jitter_factor).min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }

    /// Decide what to do after attempt `attempt` (1-based) failed.
    pub fn decide(&self, attempt: u32, key: &str) -> RetryDecision {
        if attempt >= self.max_attempts {
            warn!(
                key = %key,
                attempts = attempt,
                max_attempts = self.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::GiveUp;
        }

        let delay = self.delay_for(attempt, key);
        info!(
            key = %key,
            attempt = attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gives_up_at_max_attempts() {
        let policy = RetryPolicy::new(3);
        assert!(matches!(policy.decide(1, "fp"), RetryDecision::Retry(_)));
        assert!(matches!(policy.decide(2, "fp"), RetryDecision::Retry(_)));
        assert_eq!(policy.decide(3, "fp"), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(1_000));

        let first = policy.delay_for(1, "abc");
        let second = policy.delay_for(2, "abc");
        assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));
        assert!(second > first);
        assert_eq!(policy.delay_for(10, "abc"), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_is_deterministic_per_key() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(2, "same"), policy.delay_for(2, "same"));
    }

    #[test]
    fn test_immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.delay_for(3, "x"), Duration::ZERO);
        assert_eq!(policy.max_attempts, 4);
    }
}
