//! Worker: one competing consumer of the shared envelope queue

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::outcome::{Failure, Outcome};
use crate::envelope::Envelope;
use crate::limiter::RateLimiter;
use crate::remote::RemoteInvoker;
use crate::retry::{Attempt, RetryDecision, RetryPolicy};

/// Multi-consumer end of the envelope queue
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<Envelope>>>;

/// Per-worker output channels
pub struct WorkerStreams {
    pub successes: mpsc::Receiver<String>,
    pub failures: mpsc::Receiver<Failure>,
}

/// Where an envelope is in its attempt sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    /// Waiting out the backoff before this attempt
    Backoff(u32),
    /// Acquiring a permit and calling the remote
    Attempting(u32),
}

/// Pulls envelopes, runs each through limiter + invoker + retry policy
pub struct Worker {
    id: usize,
    invoker: Arc<dyn RemoteInvoker>,
    limiter: Arc<dyn RateLimiter>,
    policy: RetryPolicy,
}

impl Worker {
    pub fn new(id: usize, invoker: Arc<dyn RemoteInvoker>, limiter: Arc<dyn RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            id,
            invoker,
            limiter,
            policy,
        }
    }

    /// Start consuming `input` on a new task
    ///
    /// The returned streams close when the task exits: input exhausted,
    /// cancellation, or the consumer went away.
    pub fn spawn(self, cancel: CancellationToken, input: SharedReceiver) -> (JoinHandle<()>, WorkerStreams) {
        let (success_tx, successes) = mpsc::channel(1);
        let (failure_tx, failures) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(cancel, input, success_tx, failure_tx));
        (handle, WorkerStreams { successes, failures })
    }

    async fn run(
        self,
        cancel: CancellationToken,
        input: SharedReceiver,
        success_tx: mpsc::Sender<String>,
        failure_tx: mpsc::Sender<Failure>,
    ) {
        debug!(worker = self.id, "Worker::run: started");
        let mut processed = 0usize;

        while let Some(envelope) = next_envelope(&input, &cancel).await {
            let method = envelope.method.clone();
            let Some(outcome) = self.process(&cancel, envelope).await else {
                debug!(worker = self.id, %method, "Worker::run: cancelled mid-envelope");
                break;
            };

            let delivered = match outcome {
                Outcome::Success(raw) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = success_tx.send(raw) => sent.is_ok(),
                },
                Outcome::Failure(failure) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = failure_tx.send(failure) => sent.is_ok(),
                },
            };
            if !delivered {
                debug!(worker = self.id, %method, "Worker::run: outcome not delivered, stopping");
                break;
            }
            processed += 1;
        }

        debug!(worker = self.id, processed, "Worker::run: stopped");
    }

    /// Run one envelope to its outcome; `None` if cancelled first
    pub async fn process(&self, cancel: &CancellationToken, envelope: Envelope) -> Option<Outcome> {
        debug!(worker = self.id, method = %envelope.method, "Worker::process: called");
        let mut state = AttemptState::Attempting(1);

        loop {
            state = match state {
                AttemptState::Backoff(attempt) => {
                    let delay = self.policy.delay(attempt);
                    debug!(worker = self.id, attempt, ?delay, "Worker::process: backing off");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => AttemptState::Attempting(attempt),
                    }
                }
                AttemptState::Attempting(attempt) => {
                    if self.limiter.acquire(cancel).await.is_err() {
                        return None;
                    }

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return None,
                        result = self.invoker.send(&envelope) => result,
                    };
                    let last = Attempt::classify(result);

                    match self.policy.decide(attempt, &last) {
                        RetryDecision::Succeed => {
                            return Some(Outcome::Success(last.into_body().unwrap_or_default()));
                        }
                        RetryDecision::Retry => {
                            warn!(
                                worker = self.id,
                                method = %envelope.method,
                                attempt,
                                code = last.remote_error().map(|e| e.code),
                                "Worker::process: retryable failure"
                            );
                            AttemptState::Backoff(attempt + 1)
                        }
                        RetryDecision::Fail(kind) => {
                            debug!(worker = self.id, method = %envelope.method, %kind, attempt, "Worker::process: failed");
                            return Some(Outcome::Failure(Failure::from_attempt(envelope, last, kind, attempt)));
                        }
                    }
                }
            };
        }
    }
}

/// Take the next envelope, racing the queue against cancellation
async fn next_envelope(input: &SharedReceiver, cancel: &CancellationToken) -> Option<Envelope> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        envelope = async { input.lock().await.recv().await } => envelope,
    }
}
