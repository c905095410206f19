//! The boundary between calls and the HTTP stack.
//!
//! A `Transport` turns a `Request` into a `TransportCall`, a one-shot handle
//! that performs the exchange and can be canceled from any thread. The call
//! executor only ever talks to these two traits.

mod http;

use std::sync::Arc;

use async_trait::async_trait;

pub use http::{HttpConfig, ReqwestTransport};

use crate::error::TransportError;
use crate::request::Request;
use crate::response::RawResponse;

/// Factory for transport calls.
pub trait Transport: Send + Sync {
    /// Prepare a call for `request`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidRequest` when the request cannot be
    /// expressed on the wire.
    fn new_call(&self, request: &Request) -> Result<Arc<dyn TransportCall>, TransportError>;
}

/// A single prepared exchange.
#[async_trait]
pub trait TransportCall: Send + Sync {
    /// Perform the exchange. Only the first invocation does any work.
    async fn execute(&self) -> Result<RawResponse, TransportError>;

    /// Abort the exchange. An in-flight `execute` resolves to
    /// `TransportError::Canceled`. Idempotent.
    fn cancel(&self);
}
