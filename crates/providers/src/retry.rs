//! Bounded retry with exponential backoff.

use askgate_core::error::CompletionError;
use rand::Rng;
use std::time::Duration;

/// Which completion failures are retried, and how long to wait between
/// attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &askgate_config::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Network failures and configured statuses are transient. A configured
    /// status outside 429 and 5xx is ignored. Invalid bodies fail immediately.
    pub fn should_retry(&self, err: &CompletionError) -> bool {
        match err {
            CompletionError::Network(_) => true,
            CompletionError::Upstream { status_code, .. } => {
                askgate_config::is_transient_status(*status_code)
                    && self.retryable_statuses.contains(status_code)
            }
            CompletionError::InvalidResponse(_) => false,
        }
    }

    /// Delay before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_backoff.as_secs_f64() * exp;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()).max(0.0))
    }

    /// [`Self::backoff`] plus up to 10% random jitter.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let jitter = rand::rng().random_range(0.0..=0.1);
        base + base.mul_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            multiplier: 2.0,
            retryable_statuses: vec![],
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.jittered_backoff(1);
            assert!(d >= Duration::from_millis(300));
            assert!(d <= Duration::from_millis(330));
        }
    }

    #[test]
    fn transient_statuses_only() {
        let policy = RetryPolicy::default();
        let upstream = |status_code| CompletionError::Upstream {
            status_code,
            message: String::new(),
        };
        assert!(policy.should_retry(&upstream(429)));
        assert!(policy.should_retry(&upstream(503)));
        assert!(!policy.should_retry(&upstream(400)));
        assert!(!policy.should_retry(&upstream(401)));
        assert!(policy.should_retry(&CompletionError::Network("reset".into())));
        assert!(!policy.should_retry(&CompletionError::InvalidResponse("empty".into())));
    }

    #[test]
    fn client_errors_never_retried_even_if_listed() {
        let policy = RetryPolicy {
            retryable_statuses: vec![400, 404, 503],
            ..RetryPolicy::default()
        };
        let upstream = |status_code| CompletionError::Upstream {
            status_code,
            message: String::new(),
        };
        assert!(!policy.should_retry(&upstream(400)));
        assert!(!policy.should_retry(&upstream(404)));
        assert!(policy.should_retry(&upstream(503)));
    }

    #[test]
    fn from_config_never_zero_attempts() {
        let config = askgate_config::RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }
}
