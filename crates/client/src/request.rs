//! Immutable outgoing requests.
//!
//! The URL doubles as the cache key and is stored exactly as given.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::cache_mode::{CACHE_MODE_HEADER, CacheMode};

/// Errors from building a `Request`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("empty URL")]
    EmptyUrl,

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// An HTTP request plus its cache directive.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Request {
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder { method, url: url.into(), headers: HeaderMap::new(), body: None, error: None }
    }

    pub fn get(url: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::POST, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL, also the cache lookup key.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The cache directive carried by this request.
    pub fn cache_mode(&self) -> CacheMode {
        CacheMode::from_header(self.header(CACHE_MODE_HEADER))
    }

    /// Headers to put on the wire: everything except the cache directive.
    pub fn wire_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.remove(CACHE_MODE_HEADER);
        headers
    }
}

/// Builder for `Request`. Header errors are deferred to `build`.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    error: Option<RequestError>,
}

impl RequestBuilder {
    /// Append a header value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) => self.error = Some(RequestError::InvalidHeader { name: name.into(), reason: e.to_string() }),
            (_, Err(e)) => self.error = Some(RequestError::InvalidHeader { name: name.into(), reason: e.to_string() }),
        }
        self
    }

    /// Set the cache directive, replacing any earlier one.
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.headers.insert(CACHE_MODE_HEADER, HeaderValue::from_static(mode.as_str()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn build(self) -> Result<Request, RequestError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.url.is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        Ok(Request { method: self.method, url: self.url, headers: self.headers, body: self.body })
    }
}
