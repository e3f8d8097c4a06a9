//! Single-call facade over the batch dispatcher

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::dispatcher::Dispatcher;
use super::error::CallError;
use super::outcome::Outcome;
use crate::envelope::ToEnvelope;
use crate::remote::response;

impl Dispatcher {
    /// Dispatch one call and decode its payload into `T`
    ///
    /// Runs a batch of one on a child of `cancel`, so abandoning the returned
    /// future tears the batch down. The raw response text is returned
    /// alongside the result whether or not decoding succeeded; it is empty
    /// when nothing was received.
    pub async fn call<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        method: &impl ToEnvelope,
        access_token: &str,
    ) -> (String, Result<T, CallError>) {
        let envelope = method.to_envelope(access_token);
        debug!(method = %envelope.method, "Dispatcher::call: called");

        let scope = cancel.child_token();
        let _guard = scope.clone().drop_guard();
        let mut streams = self.send_many(&scope, vec![envelope], 1);

        match streams.recv().await {
            Some(Outcome::Success(raw)) => {
                let decoded = response::decode::<T>(&raw).map_err(CallError::from);
                if let Err(e) = &decoded {
                    debug!(error = %e, "Dispatcher::call: payload did not decode");
                }
                (raw, decoded)
            }
            Some(Outcome::Failure(failure)) => {
                debug!(%failure, "Dispatcher::call: failed");
                let raw = failure.response.clone().unwrap_or_default();
                (raw, Err(CallError::Failed(Box::new(failure))))
            }
            None => {
                debug!("Dispatcher::call: no outcome, cancelled");
                (String::new(), Err(CallError::Cancelled))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde::Deserialize;

    use super::*;
    use crate::envelope::{ACCESS_TOKEN_PARAM, Envelope, EnvelopeDefaults};
    use crate::limiter::Unlimited;
    use crate::remote::invoker::mock::{Reply, ScriptedInvoker};
    use crate::retry::{FailureKind, RetryPolicy};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Items {
        count: u32,
        items: Vec<u32>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        response: Items,
    }

    fn dispatcher(invoker: Arc<ScriptedInvoker>) -> Dispatcher {
        Dispatcher::new(
            invoker,
            Arc::new(Unlimited),
            RetryPolicy::new(2, Duration::from_millis(10)),
            EnvelopeDefaults::new("5.131", "en"),
        )
    }

    #[tokio::test]
    async fn test_call_decodes_payload() {
        let body = r#"{"response":{"count":4,"items":[1,2,3,4]}}"#;
        let d = dispatcher(Arc::new(ScriptedInvoker::new(Reply::body(body))));
        let (raw, result) = d
            .call::<Payload>(&CancellationToken::new(), &Envelope::new("friends.get"), "tok")
            .await;
        assert_eq!(raw, body);
        assert_eq!(
            result.unwrap().response,
            Items {
                count: 4,
                items: vec![1, 2, 3, 4]
            }
        );
    }

    #[tokio::test]
    async fn test_call_keeps_raw_on_decode_mismatch() {
        let body = r#"{"response":"plain"}"#;
        let d = dispatcher(Arc::new(ScriptedInvoker::new(Reply::body(body))));
        let (raw, result) = d
            .call::<Payload>(&CancellationToken::new(), &Envelope::new("m"), "tok")
            .await;
        assert_eq!(raw, body);
        assert!(matches!(result, Err(CallError::Decode(_))));
    }

    #[tokio::test]
    async fn test_call_failure_returns_last_response() {
        let d = dispatcher(Arc::new(ScriptedInvoker::new(Reply::remote_error(5))));
        let (raw, result) = d
            .call::<Payload>(&CancellationToken::new(), &Envelope::new("m"), "secret")
            .await;
        assert!(raw.contains("\"error_code\":5"));
        let err = result.unwrap_err();
        let failure = err.failure().expect("failure");
        assert_eq!(failure.kind, FailureKind::Remote);
        assert_eq!(failure.envelope.get(ACCESS_TOKEN_PARAM), Some("secret"));
    }

    #[tokio::test]
    async fn test_call_cancelled() {
        let d = dispatcher(Arc::new(ScriptedInvoker::new(Reply::Hang)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let (raw, result) = d.call::<Payload>(&cancel, &Envelope::new("m"), "tok").await;
        assert!(raw.is_empty());
        assert!(matches!(result, Err(CallError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropping_call_does_not_cancel_parent() {
        let invoker = Arc::new(ScriptedInvoker::new(Reply::Hang));
        let d = dispatcher(invoker);
        let cancel = CancellationToken::new();
        let envelope = Envelope::new("m");
        let pending = d.call::<Payload>(&cancel, &envelope, "tok");
        assert!(tokio::time::timeout(Duration::from_millis(20), pending).await.is_err());
        assert!(!cancel.is_cancelled());
    }
}
