//! Retry policy for remote calls
//!
//! Classifies each attempt and decides between success, another attempt
//! after backoff, or a terminal failure.

mod attempt;
mod policy;

pub use attempt::{Attempt, FailureKind};
pub use policy::{
    Backoff, DEFAULT_RETRY_CODES, FLOOD_CONTROL, INTERNAL_SERVER_ERROR, RetryDecision, RetryPolicy, TOO_MANY_REQUESTS,
};
