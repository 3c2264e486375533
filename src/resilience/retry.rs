// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry budget for queued tasks.
//!
//! A failed task is re-admitted at the back of the queue until its retry
//! budget is spent. By default re-admission is immediate (flat rotation);
//! an optional exponential backoff delays the re-append.
//!
//! # Example
//!
//! ```
//! use load_control::resilience::retry::{RetryPolicy, RetryDecision, BackoffConfig};
//! use std::time::Duration;
//!
//! let flat = RetryPolicy::default();
//! assert_eq!(flat.decide(0), RetryDecision::Requeue { delay: Duration::ZERO });
//! assert_eq!(flat.decide(3), RetryDecision::GiveUp);
//!
//! let backoff = RetryPolicy::with_backoff(3, BackoffConfig::default());
//! assert_eq!(backoff.decide(1), RetryDecision::Requeue { delay: Duration::from_millis(400) });
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential delay between a failure and its re-admission.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            factor: 2.0,
        }
    }
}

/// What to do with a task that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put it back at the tail of the queue after `delay`
    Requeue { delay: Duration },
    /// Budget spent, mark it failed
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 means 4 attempts total)
    pub max_retries: u32,
    pub backoff: Option<BackoffConfig>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::flat(3)
    }
}

impl RetryPolicy {
    /// Immediate re-admission, no delay beyond queue rotation.
    #[must_use]
    pub fn flat(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: None,
        }
    }

    #[must_use]
    pub fn with_backoff(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_retries,
            backoff: Some(backoff),
        }
    }

    /// Decide for a task that has already been retried `retries` times.
    #[must_use]
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Requeue {
            delay: self.delay_for(retries + 1),
        }
    }

    /// Delay before the `retry`-th re-admission (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let Some(backoff) = &self.backoff else {
            return Duration::ZERO;
        };
        let initial = Duration::from_millis(backoff.initial_delay_ms);
        let max = Duration::from_millis(backoff.max_delay_ms);
        let exponent = retry.saturating_sub(1) as i32;
        initial.mul_f64(backoff.factor.powi(exponent)).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_policy_allows_three_retries() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.decide(0), RetryDecision::Requeue { delay: Duration::ZERO });
        assert_eq!(policy.decide(1), RetryDecision::Requeue { delay: Duration::ZERO });
        assert_eq!(policy.decide(2), RetryDecision::Requeue { delay: Duration::ZERO });
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(10), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_budget_gives_up_immediately() {
        assert_eq!(RetryPolicy::flat(0).decide(0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let policy = RetryPolicy::with_backoff(
            5,
            BackoffConfig {
                initial_delay_ms: 100,
                max_delay_ms: 10_000,
                factor: 2.0,
            },
        );

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy::with_backoff(
            5,
            BackoffConfig {
                initial_delay_ms: 1_000,
                max_delay_ms: 5_000,
                factor: 10.0,
            },
        );

        assert_eq!(policy.delay_for(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
    }
}
