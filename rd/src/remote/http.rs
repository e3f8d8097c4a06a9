//! HTTP implementation of the RemoteInvoker
//!
//! Each envelope becomes one form-encoded POST to `base_url + method`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{RemoteInvoker, TransportError};
use crate::config::ClientConfig;
use crate::envelope::Envelope;

/// Remote invoker over HTTP POST
pub struct HttpInvoker {
    base_url: String,
    http: Client,
}

impl HttpInvoker {
    /// Create an invoker from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        debug!(?config, "HttpInvoker::from_config: called");
        Self::new(&config.base_url, Duration::from_millis(config.timeout_ms))
    }

    /// Create an invoker for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        debug!(%base_url, ?timeout, "HttpInvoker::new: called");
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            debug!("HttpInvoker::new: invalid URL protocol");
            return Err(TransportError::InvalidBaseUrl(base_url.to_string()));
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Method names are appended directly, so the base must end in a slash
fn normalize_base_url(base_url: &str) -> String {
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    }
}

#[async_trait]
impl RemoteInvoker for HttpInvoker {
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError> {
        let url = envelope.url(&self.base_url);
        debug!(%url, param_count = envelope.params.len(), "HttpInvoker::send: called");

        let response = self.http.post(url).form(&envelope.params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(%status, "HttpInvoker::send: non-success status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(body_len = body.len(), "HttpInvoker::send: success");
        Ok(body)
    }
}
