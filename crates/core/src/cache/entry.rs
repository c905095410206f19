//! Cached response entries and the read interface the request executor consumes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A stored response keyed by the request URL.
///
/// The key is the request URL exactly as the caller wrote it. No
/// normalization happens on either the write or the read side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Response body. `None` marks a tombstone-like entry that carries metadata only.
    pub data: Option<Vec<u8>>,
    pub mime_type: String,
    pub etag: Option<String>,
    /// Response headers captured when the entry was written.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub stored_at: DateTime<Utc>,
    /// `None` means the entry never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create an entry stored now that expires after `ttl`.
    pub fn new(
        key: impl Into<String>, data: impl Into<Vec<u8>>, mime_type: impl Into<String>, ttl: chrono::Duration,
    ) -> Self {
        let stored_at = Utc::now();
        Self {
            key: key.into(),
            data: Some(data.into()),
            mime_type: mime_type.into(),
            etag: None,
            headers: BTreeMap::new(),
            stored_at,
            expires_at: stored_at.checked_add_signed(ttl),
        }
    }

    /// Whether the entry is past its expiry right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Body bytes, if the entry carries a non-empty body.
    pub fn body(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|data| !data.is_empty())
    }
}

/// Read side of a response cache.
///
/// The request executor only ever calls `get`. Population, eviction and
/// persistence belong to the implementing store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up the entry stored under `key`.
    ///
    /// Returns `Ok(None)` when no entry exists. Expired entries may be
    /// returned; freshness is checked by the caller via `CacheEntry::is_expired`.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error>;
}
