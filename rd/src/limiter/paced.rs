//! Uniform-pacing rate limiter

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AcquireError, RateLimiter};
use crate::config::RateLimitConfig;

/// Evenly spaced permits: `permits` per `window`, never bursting
///
/// Permits are recorded when granted, not when requested: a waiter sleeps
/// until the next opening and then competes for it, so an abandoned waiter
/// holds nothing back. The first acquisition is immediate.
pub struct PacedLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl PacedLimiter {
    /// Create a limiter allowing `permits` per `window` (permits below 1 become 1)
    pub fn new(permits: u32, window: Duration) -> Self {
        let permits = permits.max(1);
        // Round up so that `permits` intervals never fit inside one window
        let nanos = window.as_nanos().div_ceil(u128::from(permits));
        let interval = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        debug!(permits, ?window, ?interval, "PacedLimiter::new: called");
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.permits, config.window())
    }

    /// Spacing between consecutive permits
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take a permit if one is open now, otherwise return when the next opens
    async fn try_grant(&self) -> Result<(), Instant> {
        let mut last = self.last_grant.lock().await;
        let now = Instant::now();
        match *last {
            Some(t) if t + self.interval > now => Err(t + self.interval),
            _ => {
                *last = Some(now);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RateLimiter for PacedLimiter {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AcquireError> {
        loop {
            if cancel.is_cancelled() {
                debug!("PacedLimiter::acquire: cancelled");
                return Err(AcquireError::Cancelled);
            }

            let opens = match self.try_grant().await {
                Ok(()) => return Ok(()),
                Err(opens) => opens,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("PacedLimiter::acquire: cancelled while waiting");
                    return Err(AcquireError::Cancelled);
                }
                _ = tokio::time::sleep_until(opens) => {}
            }
        }
    }
}
