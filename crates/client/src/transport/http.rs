//! reqwest-backed transport.
//!
//! - rustls TLS, gzip/brotli/deflate decoding
//! - Bounded redirects and request timeout from `HttpConfig`
//! - Bodies are buffered up to `max_bytes`; larger bodies fail the call
//! - The `cache-mode` header never reaches the wire

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::{Client, header};
use stashline_core::AppConfig;
use tokio::sync::Notify;

use super::{Transport, TransportCall};
use crate::error::TransportError;
use crate::request::Request;
use crate::response::{RawResponse, ResponseBody};

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent string (default: "stashline/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for HttpConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// `Transport` over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    config: HttpConfig,
}

impl ReqwestTransport {
    /// Build the underlying HTTP client.
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| TransportError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

impl Transport for ReqwestTransport {
    fn new_call(&self, request: &Request) -> Result<Arc<dyn TransportCall>, TransportError> {
        let mut builder = self.http.request(request.method().clone(), request.url()).headers(request.wire_headers());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        let wire = builder.build().map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Arc::new(ReqwestCall {
            http: self.http.clone(),
            max_bytes: self.config.max_bytes,
            request: Mutex::new(Some(wire)),
            canceled: AtomicBool::new(false),
            cancel_signal: Notify::new(),
        }))
    }
}

struct ReqwestCall {
    http: Client,
    max_bytes: usize,
    request: Mutex<Option<reqwest::Request>>,
    canceled: AtomicBool,
    cancel_signal: Notify,
}

impl ReqwestCall {
    async fn send(&self, request: reqwest::Request) -> Result<RawResponse, TransportError> {
        let start = Instant::now();
        let url = request.url().clone();

        let mut response = self.http.execute(request).await?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len > self.max_bytes as u64
        {
            return Err(TransportError::TooLarge { size: len, limit: self.max_bytes });
        }

        let headers = response.headers().clone();
        let mut buffered = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if buffered.len() + chunk.len() > self.max_bytes {
                let size = (buffered.len() + chunk.len()) as u64;
                return Err(TransportError::TooLarge { size, limit: self.max_bytes });
            }
            buffered.extend_from_slice(&chunk);
        }

        let content_type =
            headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(|s| s.to_string());

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            bytes = buffered.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "network exchange complete"
        );

        Ok(RawResponse::new(status, headers, ResponseBody::from_bytes(content_type, buffered.freeze())))
    }
}

#[async_trait]
impl TransportCall for ReqwestCall {
    async fn execute(&self) -> Result<RawResponse, TransportError> {
        let request = self.request.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(request) = request else {
            return Err(TransportError::InvalidRequest("transport call already executed".into()));
        };

        if self.canceled.load(Ordering::SeqCst) {
            return Err(TransportError::Canceled);
        }

        tokio::select! {
            _ = self.cancel_signal.notified() => Err(TransportError::Canceled),
            result = self.send(request) => result,
        }
    }

    fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            // notify_one keeps a permit if nobody is waiting yet
            self.cancel_signal.notify_one();
        }
    }
}
