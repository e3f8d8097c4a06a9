//! Remote transport error types

use thiserror::Error;

/// Errors from a single network round trip
///
/// A transport error never carries a structured remote error: those arrive
/// inside successful responses and are handled by the response decoder.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Expected success status, got {status}")]
    Status { status: u16, body: String },

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl TransportError {
    /// Response body received alongside the failure, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } => Some(body),
            TransportError::Network(_) | TransportError::InvalidBaseUrl(_) => None,
        }
    }

    /// HTTP status code, if the failure was a status failure
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            TransportError::InvalidBaseUrl(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_keeps_body() {
        let err = TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.body(), Some("bad gateway"));
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_invalid_base_url_has_no_body() {
        let err = TransportError::InvalidBaseUrl("nope".to_string());
        assert_eq!(err.body(), None);
        assert_eq!(err.status(), None);
    }
}
