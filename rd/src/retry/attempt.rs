//! Classification of a single attempt's result

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::remote::response::{self, DecodeError, RemoteError, ResponseKind};
use crate::remote::TransportError;

/// What one round trip produced
#[derive(Debug)]
pub enum Attempt {
    /// Well-formed payload, no remote error
    Success(String),

    /// Network or status failure
    Transport {
        body: Option<String>,
        error: TransportError,
    },

    /// Transport succeeded but the remote declared an error
    Remote { body: String, error: RemoteError },

    /// Body parsed as neither payload nor error envelope
    Decode { body: String, error: DecodeError },
}

impl Attempt {
    /// Classify the raw result of `RemoteInvoker::send`
    pub fn classify(result: Result<String, TransportError>) -> Self {
        match result {
            Ok(body) => match response::inspect(&body) {
                Ok(ResponseKind::Payload) => Attempt::Success(body),
                Ok(ResponseKind::Remote(error)) => {
                    debug!(code = error.code, "Attempt::classify: remote error");
                    Attempt::Remote { body, error }
                }
                Err(error) => {
                    debug!(%error, "Attempt::classify: undecodable body");
                    Attempt::Decode { body, error }
                }
            },
            Err(error) => {
                debug!(%error, "Attempt::classify: transport failure");
                Attempt::Transport {
                    body: error.body().map(str::to_string),
                    error,
                }
            }
        }
    }

    /// Raw text received, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            Attempt::Success(body) => Some(body),
            Attempt::Transport { body, .. } => body.as_deref(),
            Attempt::Remote { body, .. } | Attempt::Decode { body, .. } => Some(body),
        }
    }

    /// Take ownership of the raw text, if any
    pub fn into_body(self) -> Option<String> {
        match self {
            Attempt::Success(body) => Some(body),
            Attempt::Transport { body, .. } => body,
            Attempt::Remote { body, .. } | Attempt::Decode { body, .. } => Some(body),
        }
    }

    /// Structured remote error, if one was declared
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Attempt::Remote { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Why an envelope ended on the failure stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Network or status failure on the last attempt
    Transport,
    /// Retryable remote error on every attempt
    RetriesExhausted,
    /// Terminal remote error
    Remote,
    /// Response did not parse
    Decode,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::RetriesExhausted => write!(f, "retries-exhausted"),
            Self::Remote => write!(f, "remote"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let attempt = Attempt::classify(Ok(r#"{"response":1}"#.to_string()));
        assert!(matches!(attempt, Attempt::Success(_)));
        assert_eq!(attempt.body(), Some(r#"{"response":1}"#));
        assert!(attempt.remote_error().is_none());
    }

    #[test]
    fn test_classify_remote() {
        let attempt = Attempt::classify(Ok(r#"{"error":{"error_code":9,"error_msg":"Flood control"}}"#.to_string()));
        assert_eq!(attempt.remote_error().map(|e| e.code), Some(9));
    }

    #[test]
    fn test_classify_status_keeps_body() {
        let attempt = Attempt::classify(Err(TransportError::Status {
            status: 500,
            body: "internal".to_string(),
        }));
        assert!(matches!(attempt, Attempt::Transport { .. }));
        assert_eq!(attempt.body(), Some("internal"));
    }

    #[test]
    fn test_classify_decode() {
        let attempt = Attempt::classify(Ok("not json".to_string()));
        assert!(matches!(attempt, Attempt::Decode { .. }));
        assert_eq!(attempt.body(), Some("not json"));
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::RetriesExhausted.to_string(), "retries-exhausted");
        assert_eq!(FailureKind::Decode.to_string(), "decode");
    }
}
