//! Submission retry policy.

use std::time::Duration;

use serde::Deserialize;

/// Bounded exponential backoff for retryable submission errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total submission attempts, including the first.
    pub max_attempts: u32,
    #[serde(with = "orbit_protocol::duration::millis")]
    pub initial_delay: Duration,
    #[serde(with = "orbit_protocol::duration::millis")]
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay_for_attempt(1)`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}
