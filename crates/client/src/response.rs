//! Raw transport responses and the typed results calls produce.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;

/// Where a `Response` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOrigin {
    Network,
    Cache,
}

/// Body of a raw response: a one-shot byte stream plus its declared type and length.
pub struct ResponseBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    source: Box<dyn Read + Send>,
}

impl ResponseBody {
    pub fn new(content_type: Option<String>, content_length: Option<u64>, source: Box<dyn Read + Send>) -> Self {
        Self { content_type, content_length, source }
    }

    /// A body backed by bytes already in memory.
    pub fn from_bytes(content_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(content_type, Some(len), Box::new(std::io::Cursor::new(bytes)))
    }

    pub fn empty() -> Self {
        Self::from_bytes(None, Bytes::new())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Split into metadata and the stream.
    pub(crate) fn into_parts(self) -> (Option<String>, Option<u64>, Box<dyn Read + Send>) {
        (self.content_type, self.content_length, self.source)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A response as the transport hands it over, body still unread.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self { status, headers, body }
    }
}

/// Status line and headers of a completed response, detached from its body.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub origin: ResponseOrigin,
}

/// Outcome of a call that reached a response.
///
/// A 2xx status yields `Success`; `body` is `None` only for 204 and 205.
/// Any other status yields `Error` with the body fully buffered.
#[derive(Debug, Clone)]
pub enum Response<T> {
    Success { body: Option<T>, meta: ResponseMeta },
    Error { body: Bytes, meta: ResponseMeta },
}

impl<T> Response<T> {
    pub fn meta(&self) -> &ResponseMeta {
        match self {
            Response::Success { meta, .. } | Response::Error { meta, .. } => meta,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.meta().status
    }

    pub fn origin(&self) -> ResponseOrigin {
        self.meta().origin
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// Converted body of a successful response.
    pub fn body(&self) -> Option<&T> {
        match self {
            Response::Success { body, .. } => body.as_ref(),
            Response::Error { .. } => None,
        }
    }

    pub fn into_body(self) -> Option<T> {
        match self {
            Response::Success { body, .. } => body,
            Response::Error { .. } => None,
        }
    }

    /// Buffered body of an error response.
    pub fn error_body(&self) -> Option<&Bytes> {
        match self {
            Response::Error { body, .. } => Some(body),
            Response::Success { .. } => None,
        }
    }
}
