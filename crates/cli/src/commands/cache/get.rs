//! `cache get` command.
//!
//! Shows the entry stored under a URL, expired or not.

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use stashline_core::{CacheDb, CacheEntry, Error};

use crate::error::CliError;

/// Parameters for the cache get command.
#[derive(Debug, Clone, Args)]
pub struct CacheGetParams {
    /// URL the entry is stored under.
    pub url: String,

    /// Include the body, lossily decoded as text.
    #[arg(long)]
    pub body: bool,
}

/// Output from the cache get command.
#[derive(Debug, Clone, Serialize)]
pub struct CacheGetOutput {
    pub key: String,
    pub mime_type: String,
    pub etag: Option<String>,
    pub size: usize,
    pub stored_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CacheGetOutput {
    fn new(entry: CacheEntry, with_body: bool) -> Self {
        let expired = entry.is_expired();
        let size = entry.data.as_ref().map_or(0, Vec::len);
        let body = entry.body().filter(|_| with_body).map(|b| String::from_utf8_lossy(b).into_owned());
        Self {
            key: entry.key,
            mime_type: entry.mime_type,
            etag: entry.etag,
            size,
            stored_at: entry.stored_at,
            expires_at: entry.expires_at,
            expired,
            body,
        }
    }
}

/// Implementation of the cache get command.
pub async fn get_impl(cache: &CacheDb, params: CacheGetParams) -> Result<CacheGetOutput, CliError> {
    let entry = cache.get_entry(&params.url).await?.ok_or_else(|| Error::CacheMiss(params.url.clone()))?;
    Ok(CacheGetOutput::new(entry, params.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_impl_missing() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let params = CacheGetParams { url: "https://example.com/nope".into(), body: false };

        let err = get_impl(&cache, params).await.unwrap_err();
        assert!(matches!(err, CliError::Cache(Error::CacheMiss(_))));
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let mut entry = CacheEntry::new("https://example.com/items", "hello", "text/plain", chrono::Duration::hours(1));
        entry.etag = Some("\"v2\"".into());
        cache.upsert_entry(&entry).await.unwrap();

        let params = CacheGetParams { url: "https://example.com/items".into(), body: true };
        let out = get_impl(&cache, params).await.unwrap();
        assert_eq!(out.size, 5);
        assert_eq!(out.etag.as_deref(), Some("\"v2\""));
        assert!(!out.expired);
        assert_eq!(out.body.as_deref(), Some("hello"));

        let params = CacheGetParams { url: "https://example.com/items".into(), body: false };
        assert!(get_impl(&cache, params).await.unwrap().body.is_none());
    }

    #[tokio::test]
    async fn test_get_impl_reports_expired() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let entry = CacheEntry::new("https://example.com/old", "x", "text/plain", chrono::Duration::seconds(-1));
        cache.upsert_entry(&entry).await.unwrap();

        let params = CacheGetParams { url: "https://example.com/old".into(), body: false };
        assert!(get_impl(&cache, params).await.unwrap().expired);
    }
}
