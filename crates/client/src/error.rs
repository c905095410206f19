//! Call, transport and conversion error types.

use std::sync::Arc;

/// Why a call produced no `Response`.
///
/// Non-2xx statuses are not errors; they arrive as `Response::Error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The handle was already executed or enqueued once.
    #[error("ALREADY_EXECUTED: call has already been executed")]
    AlreadyExecuted,

    /// The network exchange failed, or the response stream faulted while
    /// the body was being read.
    #[error("TRANSPORT_FAILURE: {0}")]
    Transport(#[from] TransportError),

    /// A 2xx body could not be converted into the target type.
    #[error("CONVERSION_ERROR: {0}")]
    Conversion(#[from] ConversionError),

    /// The call was canceled before it produced a result.
    #[error("CANCELED: call was canceled")]
    Canceled,

    /// A dispatched call panicked on its worker, usually inside a converter.
    #[error("CALL_PANICKED: {0}")]
    Panicked(String),
}

impl CallError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, CallError::Canceled)
    }
}

/// Errors raised by a `Transport` implementation.
///
/// Sources are held behind `Arc` so the error stays `Clone`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request could not be turned into a wire request (bad URL, bad header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The underlying HTTP client could not be built.
    #[error("client setup failed: {0}")]
    Setup(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Reading the response stream failed.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Response body exceeded the configured limit.
    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: u64, limit: usize },

    /// The transport call was canceled while in flight.
    #[error("transport call canceled")]
    Canceled,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { TransportError::Timeout } else { TransportError::Network(Arc::new(err)) }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// Errors from assembling a `Client`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    /// The default HTTP transport could not be created.
    #[error("CLIENT_SETUP: {0}")]
    Transport(#[from] TransportError),

    /// No runtime handle was given and none is current.
    #[error("CLIENT_SETUP: no tokio runtime available for the dispatcher")]
    NoRuntime,
}

/// A converter rejected a response body.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid JSON body: {err}"))
    }
}

impl From<std::string::FromUtf8Error> for ConversionError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::new(format!("body is not valid UTF-8: {err}"))
    }
}
