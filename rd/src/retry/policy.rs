//! Retry policy implementation

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::attempt::{Attempt, FailureKind};
use crate::config::RetryConfig;

/// Too many requests per second
pub const TOO_MANY_REQUESTS: i64 = 6;

/// Flood control
pub const FLOOD_CONTROL: i64 = 9;

/// Internal server error reported in-band
pub const INTERNAL_SERVER_ERROR: i64 = 10;

/// Remote error codes retried by default
pub const DEFAULT_RETRY_CODES: [i64; 3] = [TOO_MANY_REQUESTS, FLOOD_CONTROL, INTERNAL_SERVER_ERROR];

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// base, 2*base, 4*base, ...
    #[default]
    Exponential,
    /// base every time
    Fixed,
}

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Emit the response as a success
    Succeed,
    /// Back off and attempt again
    Retry,
    /// Emit a failure of this kind
    Fail(FailureKind),
}

/// Bounded retry with backoff, keyed on remote error codes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
    jitter: Duration,
    retry_transport_errors: bool,
    retry_codes: BTreeSet<i64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Exponential policy with default codes; attempts below 1 become 1
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential,
            jitter: Duration::ZERO,
            retry_transport_errors: true,
            retry_codes: DEFAULT_RETRY_CODES.into_iter().collect(),
        }
    }

    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        debug!(?config, "RetryPolicy::from_config: called");
        Self {
            attempts: config.attempts.max(1),
            base_delay: Duration::from_millis(config.delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.delay_ms)),
            backoff: config.backoff,
            jitter: Duration::from_millis(config.jitter_ms),
            retry_transport_errors: config.retry_transport_errors,
            retry_codes: config.retry_codes.iter().copied().collect(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_retry_codes(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.retry_codes = codes.into_iter().collect();
        self
    }

    pub fn with_transport_retries(mut self, enabled: bool) -> Self {
        self.retry_transport_errors = enabled;
        self
    }

    /// Attempt ceiling, including the first attempt
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a remote error code is eligible for another attempt
    pub fn is_retryable_code(&self, code: i64) -> bool {
        self.retry_codes.contains(&code)
    }

    /// Delay before attempt number `attempt` (1-based; the first has none)
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let base = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow((attempt - 2).min(31));
                self.base_delay.saturating_mul(factor)
            }
        };
        let delay = base.min(self.max_delay);

        if self.jitter.is_zero() {
            return delay;
        }
        let extra = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(extra)
    }

    /// Decide the next step from the last attempt only
    pub fn decide(&self, attempt: u32, last: &Attempt) -> RetryDecision {
        let budget_left = attempt < self.attempts;
        let decision = match last {
            Attempt::Success(_) => RetryDecision::Succeed,
            Attempt::Remote { error, .. } if self.is_retryable_code(error.code) => {
                if budget_left {
                    RetryDecision::Retry
                } else {
                    RetryDecision::Fail(FailureKind::RetriesExhausted)
                }
            }
            Attempt::Remote { .. } => RetryDecision::Fail(FailureKind::Remote),
            Attempt::Transport { .. } => {
                if self.retry_transport_errors && budget_left {
                    RetryDecision::Retry
                } else {
                    RetryDecision::Fail(FailureKind::Transport)
                }
            }
            Attempt::Decode { .. } => RetryDecision::Fail(FailureKind::Decode),
        };
        debug!(attempt, attempts = self.attempts, ?decision, "RetryPolicy::decide");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::TransportError;

    fn remote(code: i64) -> Attempt {
        Attempt::classify(Ok(format!(
            r#"{{"error":{{"error_code":{},"error_msg":"x"}}}}"#,
            code
        )))
    }

    fn status(code: u16) -> Attempt {
        Attempt::classify(Err(TransportError::Status {
            status: code,
            body: String::new(),
        }))
    }

    #[test]
    fn test_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::from_millis(1)).attempts(), 1);
        let config = RetryConfig {
            attempts: 0,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).attempts(), 1);
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::ZERO);
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1)).with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay(4), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(5));
        assert_eq!(policy.delay(90), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250)).with_backoff(Backoff::Fixed);
        assert_eq!(policy.delay(2), Duration::from_millis(250));
        assert_eq!(policy.delay(4), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig {
            delay_ms: 100,
            jitter_ms: 50,
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);
        for _ in 0..20 {
            let d = policy.delay(2);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_retryable_codes_retry_until_budget() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        for code in DEFAULT_RETRY_CODES {
            assert_eq!(policy.decide(1, &remote(code)), RetryDecision::Retry);
            assert_eq!(policy.decide(2, &remote(code)), RetryDecision::Retry);
            assert_eq!(
                policy.decide(3, &remote(code)),
                RetryDecision::Fail(FailureKind::RetriesExhausted)
            );
        }
    }

    #[test]
    fn test_terminal_code_fails_immediately() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        assert_eq!(policy.decide(1, &remote(15)), RetryDecision::Fail(FailureKind::Remote));
    }

    #[test]
    fn test_custom_retry_codes() {
        let policy = RetryPolicy::new(3, Duration::ZERO).with_retry_codes([29]);
        assert_eq!(policy.decide(1, &remote(29)), RetryDecision::Retry);
        assert_eq!(policy.decide(1, &remote(6)), RetryDecision::Fail(FailureKind::Remote));
    }

    #[test]
    fn test_transport_errors_use_budget() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        assert_eq!(policy.decide(1, &status(500)), RetryDecision::Retry);
        assert_eq!(policy.decide(2, &status(500)), RetryDecision::Fail(FailureKind::Transport));

        let policy = policy.with_transport_retries(false);
        assert_eq!(policy.decide(1, &status(500)), RetryDecision::Fail(FailureKind::Transport));
    }

    #[test]
    fn test_decode_and_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let decode = Attempt::classify(Ok("garbage".to_string()));
        assert_eq!(policy.decide(1, &decode), RetryDecision::Fail(FailureKind::Decode));
        let ok = Attempt::classify(Ok("{}".to_string()));
        assert_eq!(policy.decide(1, &ok), RetryDecision::Succeed);
    }
}
