//! Batch dispatch: worker pool, fan-in streams, and the single-call facade
//!
//! `Dispatcher::send_many` runs a batch of envelopes through a pool of
//! competing workers. Each worker paces itself on the shared rate limiter
//! and retries per the retry policy; every envelope ends as exactly one
//! outcome on either the success or the failure stream, unless the caller
//! cancels first.

mod dispatcher;
mod error;
mod facade;
mod outcome;
mod worker;

pub use dispatcher::{Dispatcher, pool_size};
pub use error::CallError;
pub use outcome::{Failure, Outcome, OutcomeStreams};
pub use worker::{SharedReceiver, Worker, WorkerStreams};
