//! Dispatcher implementation
//!
//! Fan-out: a feeder task publishes envelopes on one queue that every
//! worker competes for. Fan-in: per-worker outputs are forwarded into two
//! aggregate streams, each closing once its last forwarder finishes.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::outcome::OutcomeStreams;
use super::worker::{SharedReceiver, Worker};
use crate::config::Config;
use crate::envelope::{Envelope, EnvelopeDefaults};
use crate::limiter::{self, RateLimiter};
use crate::remote::{HttpInvoker, RemoteInvoker, TransportError};
use crate::retry::RetryPolicy;

/// Sizes worker pools and runs batches through them
///
/// Cheap to share behind an `Arc`; each `send_many` call builds its own
/// queue, workers, and streams. The rate limiter is shared by every pool
/// this dispatcher starts.
pub struct Dispatcher {
    invoker: Arc<dyn RemoteInvoker>,
    limiter: Arc<dyn RateLimiter>,
    policy: RetryPolicy,
    defaults: EnvelopeDefaults,
}

impl Dispatcher {
    pub fn new(
        invoker: Arc<dyn RemoteInvoker>,
        limiter: Arc<dyn RateLimiter>,
        policy: RetryPolicy,
        defaults: EnvelopeDefaults,
    ) -> Self {
        debug!(?policy, ?defaults, "Dispatcher::new: called");
        Self {
            invoker,
            limiter,
            policy,
            defaults,
        }
    }

    /// Build an HTTP-backed dispatcher from configuration
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        debug!("Dispatcher::from_config: called");
        let invoker = HttpInvoker::from_config(&config.client)?;
        Ok(Self::new(
            Arc::new(invoker),
            limiter::from_config(&config.rate_limit),
            RetryPolicy::from_config(&config.retry),
            EnvelopeDefaults::new(&config.client.version, &config.client.lang),
        ))
    }

    /// Point this dispatcher at another limiter (e.g. one shared process-wide)
    pub fn set_rate_limiter(&mut self, limiter: Arc<dyn RateLimiter>) {
        debug!("Dispatcher::set_rate_limiter: called");
        self.limiter = limiter;
    }

    /// The limiter gating this dispatcher's calls
    pub fn rate_limiter(&self) -> Arc<dyn RateLimiter> {
        self.limiter.clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch a batch across a pool of `concurrency` workers
    ///
    /// The pool size is clamped to `1..=batch.len()`. Every envelope yields
    /// exactly one outcome on one of the two streams unless `cancel` fires
    /// first; envelopes not yet completed at cancellation yield nothing.
    /// Must be called within a Tokio runtime.
    pub fn send_many(&self, cancel: &CancellationToken, batch: Vec<Envelope>, concurrency: usize) -> OutcomeStreams {
        if batch.is_empty() {
            debug!("Dispatcher::send_many: empty batch");
            return OutcomeStreams::closed();
        }

        let workers = pool_size(concurrency, batch.len());
        info!(batch = batch.len(), requested = concurrency, workers, "Dispatching batch");

        let input: SharedReceiver = Arc::new(Mutex::new(feed(cancel, batch, self.defaults.clone())));

        let mut handles = Vec::with_capacity(workers);
        let mut success_streams = Vec::with_capacity(workers);
        let mut failure_streams = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker::new(id, self.invoker.clone(), self.limiter.clone(), self.policy.clone());
            let (handle, streams) = worker.spawn(cancel.clone(), input.clone());
            handles.push(handle);
            success_streams.push(streams.successes);
            failure_streams.push(streams.failures);
        }
        drop(input);

        supervise(handles);

        OutcomeStreams {
            successes: merge(cancel, success_streams, workers),
            failures: merge(cancel, failure_streams, workers),
        }
    }
}

/// Workers for a batch: never more than the work, never fewer than one
pub fn pool_size(requested: usize, batch_len: usize) -> usize {
    requested.min(batch_len).max(1)
}

/// Publish the batch on a fresh queue, stamping defaults on the way
///
/// Stops early on cancellation (remaining envelopes are dropped) or when
/// every worker has gone away.
fn feed(cancel: &CancellationToken, batch: Vec<Envelope>, defaults: EnvelopeDefaults) -> mpsc::Receiver<Envelope> {
    let (tx, rx) = mpsc::channel(1);
    let cancel = cancel.clone();

    tokio::spawn(async move {
        let total = batch.len();
        let mut published = 0usize;
        for mut envelope in batch {
            envelope.apply_defaults(&defaults);
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = tx.send(envelope) => sent.is_ok(),
            };
            if !sent {
                break;
            }
            published += 1;
        }

        if published < total {
            warn!(published, dropped = total - published, "feed: stopped before publishing whole batch");
        } else {
            debug!(published, "feed: batch published");
        }
    });

    rx
}

/// Forward every input into one output, closing it after the last input
fn merge<T: Send + 'static>(
    cancel: &CancellationToken,
    inputs: Vec<mpsc::Receiver<T>>,
    buffer: usize,
) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(buffer.max(1));

    for mut input in inputs {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    item = input.recv() => item,
                };
                let Some(item) = item else { break };
                let forwarded = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = tx.send(item) => sent.is_ok(),
                };
                if !forwarded {
                    break;
                }
            }
        });
    }

    rx
}

/// Join the pool in the background, surfacing worker panics
fn supervise(handles: Vec<JoinHandle<()>>) {
    tokio::spawn(async move {
        let count = handles.len();
        for (id, result) in futures::future::join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(worker = id, error = %e, "Worker terminated abnormally");
            }
        }
        debug!(workers = count, "supervise: all workers exited");
    });
}
