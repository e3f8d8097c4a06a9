//! Response decoding: structured remote errors vs. payloads

use std::fmt;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Marker whose presence triggers structured error parsing
const ERROR_CODE_MARKER: &str = "error_code";

/// Remote-declared error, delivered inside an otherwise successful response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(rename = "error_code")]
    pub code: i64,

    #[serde(rename = "error_msg", default)]
    pub message: String,

    #[serde(default)]
    pub request_params: Vec<RequestParam>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}: {}", self.code, self.message)
    }
}

/// One parameter echoed back by the remote alongside an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParam {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<RemoteError>,
}

/// Body did not parse as the expected shape
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// What a transport-successful response turned out to contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// A well-formed payload with no remote error
    Payload,

    /// A remote-declared error
    Remote(RemoteError),
}

/// Fast-path check for a possible error envelope
pub fn has_error_code(raw: &str) -> bool {
    raw.contains(ERROR_CODE_MARKER)
}

/// Classify a raw response body
///
/// Bodies mentioning `error_code` are parsed as an error envelope; anything
/// else only has to be valid JSON.
pub fn inspect(raw: &str) -> Result<ResponseKind, DecodeError> {
    debug!(len = raw.len(), "inspect: called");
    if has_error_code(raw) {
        match serde_json::from_str::<ErrorEnvelope>(raw) {
            Ok(ErrorEnvelope { error: Some(error) }) => {
                debug!(code = error.code, "inspect: remote error");
                return Ok(ResponseKind::Remote(error));
            }
            Ok(ErrorEnvelope { error: None }) => {
                debug!("inspect: error_code marker without error envelope");
                return Ok(ResponseKind::Payload);
            }
            Err(e) => {
                // Only a present-but-malformed `error` member is a decode failure
                let value: serde_json::Value = serde_json::from_str(raw)?;
                if value.get("error").is_some() {
                    return Err(e.into());
                }
                debug!("inspect: error_code marker inside non-envelope payload");
                return Ok(ResponseKind::Payload);
            }
        }
    }

    serde_json::from_str::<IgnoredAny>(raw)?;
    Ok(ResponseKind::Payload)
}

/// Decode a raw payload into the caller's type
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    Ok(serde_json::from_str(raw)?)
}
