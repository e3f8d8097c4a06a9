//! Rate limiting for remote calls
//!
//! A limiter is an explicit capability shared by every worker of a pool.
//! Pass the same `Arc` to several dispatchers to pace them together.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RateLimitConfig;

mod paced;

pub use paced::PacedLimiter;

/// Acquisition did not yield a permit
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Rate limiter acquisition cancelled")]
    Cancelled,
}

/// Gate in front of every remote attempt
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Block until a permit is available or `cancel` fires
    async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AcquireError>;
}

/// Limiter that never waits
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        Ok(())
    }
}

/// Build the limiter described by configuration (`permits: 0` disables pacing)
pub fn from_config(config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    debug!(?config, "limiter::from_config: called");
    if config.permits == 0 {
        debug!("limiter::from_config: pacing disabled");
        Arc::new(Unlimited)
    } else {
        Arc::new(PacedLimiter::from_config(config))
    }
}
