//! Retry and polling schedules.

use std::time::Duration;

use serde::Deserialize;

/// Exponential backoff for transport failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    #[serde(with = "orbit_protocol::duration::millis")]
    pub initial_delay: Duration,
    /// Backoff cap.
    #[serde(with = "orbit_protocol::duration::millis")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Apply ±25% jitter to each delay.
    pub jitter: bool,
    /// Consecutive failures before the network is declared unavailable.
    pub max_consecutive_failures: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
            max_consecutive_failures: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failure number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000.0)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }
}

/// Poll schedule used while waiting for a transaction to confirm.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    #[serde(with = "orbit_protocol::duration::secs")]
    pub initial_interval: Duration,
    #[serde(with = "orbit_protocol::duration::secs")]
    pub max_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl ConfirmationPolicy {
    pub fn next_interval(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.max_consecutive_failures, 5);
    }

    #[test]
    fn delays_double_up_to_cap_without_jitter() {
        let policy = BackoffPolicy {
            jitter: false,
            ..BackoffPolicy::default()
        };
        let delays: Vec<u128> = (1..=7).map(|a| policy.delay_for_attempt(a).as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn jittered_delays_stay_within_quarter() {
        let policy = BackoffPolicy::default();
        let expected_base = [0.5, 1.0, 2.0, 4.0, 8.0, 10.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let secs = policy.delay_for_attempt((i + 1) as u32).as_secs_f64();
            assert!(
                secs >= base * 0.74 && secs <= base * 1.26,
                "attempt {}: {secs:.3}s",
                i + 1
            );
        }
    }

    #[test]
    fn confirmation_interval_doubles_to_cap() {
        let policy = ConfirmationPolicy::default();
        let mut interval = policy.initial_interval;
        let mut seen = vec![interval.as_secs()];
        for _ in 0..5 {
            interval = policy.next_interval(interval);
            seen.push(interval.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn policy_from_partial_json() {
        let policy: BackoffPolicy =
            serde_json::from_str(r#"{"initial_delay": 100, "jitter": false}"#).unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert!(!policy.jitter);
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }
}
