//! Remote service collaborators
//!
//! The invoker performs round trips; the response module tells payloads
//! apart from remote-declared errors.

mod error;
mod http;
pub mod invoker;
pub mod response;

pub use error::TransportError;
pub use http::HttpInvoker;
pub use invoker::RemoteInvoker;
pub use response::{DecodeError, RemoteError, RequestParam, ResponseKind};
