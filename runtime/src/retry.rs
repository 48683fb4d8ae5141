//! Bounded retry with fixed backoff.
//!
//! The bus contract is deliberately simple: a fixed number of handler
//! invocations with a constant pause between them, then dead-letter. No
//! exponential growth; consumers that need longer recovery windows pick a
//! larger backoff.

use std::time::Duration;

/// Retry configuration for fact delivery.
///
/// `max_attempts` counts **total** handler invocations, not retries: the
/// default of 3 means one initial attempt plus two retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of handler invocations before dead-lettering.
    pub max_attempts: usize,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit attempts and backoff.
    #[must_use]
    pub const fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Policy suited to tests: same attempt count, negligible backoff.
    #[must_use]
    pub const fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            backoff: Duration::from_millis(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_the_bus_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_millis(1000));
    }
}
