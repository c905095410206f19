//! Serving calls from the response cache.
//!
//! A fresh entry is replayed as a synthetic 200 response through the same
//! parser network responses go through. The cache is best effort: every
//! failure on this path reads as a miss.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue};
use stashline_core::{CacheEntry, CacheStore};

use crate::convert::ResponseConverter;
use crate::parse::parse_response;
use crate::request::Request;
use crate::response::{RawResponse, Response, ResponseBody, ResponseOrigin};

/// Resolves calls against an optional cache store.
#[derive(Clone, Default)]
pub struct CacheFallbackResolver {
    cache: Option<Arc<dyn CacheStore>>,
}

impl CacheFallbackResolver {
    pub fn new(cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self { cache }
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// A response built from the fresh entry stored under the request URL,
    /// or `None` on any kind of miss.
    pub async fn resolve<T>(&self, request: &Request, converter: &ResponseConverter<T>) -> Option<Response<T>> {
        let cache = self.cache.as_ref()?;
        let key = request.url();

        let entry = match cache.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(key, "cache miss: no entry");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        if entry.is_expired() {
            tracing::debug!(key, "cache miss: entry expired");
            return None;
        }

        let raw = synthesize(&entry)?;
        match parse_response(raw, request, converter, ResponseOrigin::Cache) {
            Ok(response) => {
                tracing::debug!(key, "cache hit");
                Some(response)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cached entry could not be parsed; treating as miss");
                None
            }
        }
    }
}

impl std::fmt::Debug for CacheFallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFallbackResolver").field("has_cache", &self.has_cache()).finish()
    }
}

/// Rebuild a 200 response from an entry that carries a body.
fn synthesize(entry: &CacheEntry) -> Option<RawResponse> {
    let Some(body) = entry.body() else {
        tracing::debug!(key = %entry.key, "cache miss: entry has no data");
        return None;
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            headers.append(name, value);
        }
    }
    if let Some(etag) = entry.etag.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(ETAG, etag);
    }

    let content_type = Some(entry.mime_type.clone()).filter(|m| !m.is_empty());
    if let Some(value) = content_type.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(CONTENT_TYPE, value);
    }

    let body = ResponseBody::from_bytes(content_type, body.to_vec());
    Some(RawResponse::new(StatusCode::OK, headers, body))
}
