//! Error types for the single-call facade

use thiserror::Error;

use super::outcome::Failure;
use crate::remote::DecodeError;

/// Why a single call did not produce a typed value
#[derive(Debug, Error)]
pub enum CallError {
    /// The envelope ended on the failure stream
    #[error("Call failed: {0}")]
    Failed(Box<Failure>),

    /// The call succeeded but the payload did not fit the target type
    #[error("Failed to decode response: {0}")]
    Decode(#[from] DecodeError),

    /// Cancelled before an outcome arrived
    #[error("Call cancelled before completion")]
    Cancelled,
}

impl CallError {
    /// The underlying failure, if the envelope reached one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            CallError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
