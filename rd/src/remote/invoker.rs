//! RemoteInvoker trait definition

use async_trait::async_trait;

use super::TransportError;
use crate::envelope::Envelope;

/// One network round trip for one envelope
///
/// Returns the raw response text on transport success. Remote-declared
/// errors are part of that text; only network and status failures are
/// reported as `TransportError`. Cancellation is dropping the future.
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError>;
}
