//! reqdispatch - Rate-limited, retry-aware batch request dispatcher
//!
//! Sends many remote method calls to a JSON-over-HTTP API concurrently,
//! pacing them under a rate limit and retrying transient failures, and
//! delivers every result on one of two streams.
//!
//! # Core Concepts
//!
//! - **Envelopes**: a method name plus form parameters, one per call
//! - **Competing Workers**: a pool consumes one shared queue per batch
//! - **Two Streams**: raw successes and structured failures, closed when the pool is done
//! - **Explicit Capabilities**: the rate limiter and invoker are passed in, never global
//!
//! # Modules
//!
//! - [`envelope`] - Request envelopes and token attachment
//! - [`remote`] - Invoker trait, HTTP transport, response decoding
//! - [`retry`] - Attempt classification and retry decisions
//! - [`limiter`] - Rate limiter capability
//! - [`dispatch`] - Worker pool, outcome streams, single-call facade
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod limiter;
pub mod remote;
pub mod retry;

// Re-export commonly used types
pub use config::{ClientConfig, Config, DispatchConfig, RateLimitConfig, RetryConfig};
pub use dispatch::{CallError, Dispatcher, Failure, Outcome, OutcomeStreams};
pub use envelope::{Envelope, EnvelopeDefaults, ToEnvelope};
pub use limiter::{AcquireError, PacedLimiter, RateLimiter, Unlimited};
pub use remote::{DecodeError, HttpInvoker, RemoteError, RemoteInvoker, TransportError};
pub use retry::{Backoff, FailureKind, RetryDecision, RetryPolicy};

// Cancellation is part of every public signature
pub use tokio_util::sync::CancellationToken;
