//! Outcome types delivered to the caller

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::envelope::Envelope;
use crate::remote::RemoteError;
use crate::retry::{Attempt, FailureKind};

/// Result of dispatching one envelope
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Raw response text
    Success(String),
    Failure(Failure),
}

/// An envelope that did not produce a usable response
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    /// The envelope as submitted
    pub envelope: Envelope,

    /// Last raw response, if any was received
    pub response: Option<String>,

    /// Last structured remote error, if any
    pub remote_error: Option<RemoteError>,

    pub kind: FailureKind,

    /// Human-readable diagnostic
    pub info: String,

    /// Attempts made before giving up
    pub attempts: u32,
}

impl Failure {
    /// Build a failure from the final attempt of an envelope
    pub fn from_attempt(envelope: Envelope, last: Attempt, kind: FailureKind, attempts: u32) -> Self {
        let info = match (&last, kind) {
            (Attempt::Remote { error, .. }, FailureKind::RetriesExhausted) => {
                format!("retries exhausted after {} attempts: {}", attempts, error)
            }
            (Attempt::Remote { error, .. }, _) => error.to_string(),
            (Attempt::Transport { error, .. }, _) if attempts > 1 => {
                format!("{} (after {} attempts)", error, attempts)
            }
            (Attempt::Transport { error, .. }, _) => error.to_string(),
            (Attempt::Decode { error, .. }, _) => error.to_string(),
            (Attempt::Success(_), _) => "unexpected success classified as failure".to_string(),
        };
        let remote_error = last.remote_error().cloned();
        Self {
            envelope,
            response: last.into_body(),
            remote_error,
            kind,
            info,
            attempts,
        }
    }

    /// Copy safe to log or persist
    pub fn redacted(&self) -> Failure {
        Failure {
            envelope: self.envelope.redacted(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.envelope.method, self.kind, self.info)
    }
}

/// The two aggregate result streams of one dispatch
///
/// Both streams must be drained (or the dispatch cancelled): an unread
/// stream fills up and stalls the workers feeding it.
pub struct OutcomeStreams {
    pub successes: mpsc::Receiver<String>,
    pub failures: mpsc::Receiver<Failure>,
}

impl OutcomeStreams {
    /// Streams that are already closed
    pub(crate) fn closed() -> Self {
        let (_, successes) = mpsc::channel(1);
        let (_, failures) = mpsc::channel(1);
        Self { successes, failures }
    }

    /// Next outcome from whichever stream yields first; `None` once both close
    pub async fn recv(&mut self) -> Option<Outcome> {
        tokio::select! {
            Some(raw) = self.successes.recv() => Some(Outcome::Success(raw)),
            Some(failure) = self.failures.recv() => Some(Outcome::Failure(failure)),
            else => None,
        }
    }

    /// Drain both streams concurrently until they close
    pub async fn collect(self) -> (Vec<String>, Vec<Failure>) {
        debug!("OutcomeStreams::collect: called");
        let Self {
            mut successes,
            mut failures,
        } = self;

        let drain_successes = async {
            let mut out = Vec::new();
            while let Some(raw) = successes.recv().await {
                out.push(raw);
            }
            out
        };
        let drain_failures = async {
            let mut out = Vec::new();
            while let Some(failure) = failures.recv().await {
                out.push(failure);
            }
            out
        };

        let (ok, failed) = tokio::join!(drain_successes, drain_failures);
        debug!(successes = ok.len(), failures = failed.len(), "OutcomeStreams::collect: done");
        (ok, failed)
    }
}
