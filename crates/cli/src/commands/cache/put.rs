//! `cache put` command.
//!
//! Seeds the cache with a body for a URL, from an inline string or a file.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use stashline_core::{CacheDb, CacheEntry};

use crate::commands::ttl_from_secs;
use crate::error::CliError;

/// Parameters for the cache put command.
#[derive(Debug, Clone, Args)]
pub struct CachePutParams {
    /// URL to store the entry under, used verbatim.
    pub url: String,

    /// Body given inline.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,

    /// Body read from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Content type recorded with the entry.
    #[arg(long, default_value = "application/octet-stream")]
    pub mime: String,

    /// Lifetime in seconds (default: configured TTL).
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

/// Output from the cache put command.
#[derive(Debug, Clone, Serialize)]
pub struct CachePutOutput {
    pub key: String,
    pub size: usize,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Implementation of the cache put command.
pub async fn put_impl(
    cache: &CacheDb, default_ttl: chrono::Duration, params: CachePutParams,
) -> Result<CachePutOutput, CliError> {
    let data = match (params.data, &params.file) {
        (Some(data), _) => data.into_bytes(),
        (None, Some(path)) => tokio::fs::read(path).await?,
        (None, None) => return Err(CliError::InvalidInput("one of --data or --file is required".into())),
    };

    let ttl = params.ttl_secs.map(ttl_from_secs).transpose()?.unwrap_or(default_ttl);
    let entry = CacheEntry::new(params.url, data, params.mime, ttl);
    cache.upsert_entry(&entry).await?;

    let size = entry.data.as_ref().map_or(0, Vec::len);
    tracing::info!(key = %entry.key, bytes = size, "cache entry stored");
    Ok(CachePutOutput { key: entry.key, size, expires_at: entry.expires_at })
}
