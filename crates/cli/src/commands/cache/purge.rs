//! `cache purge` command.
//!
//! Always drops expired entries; `--max-entries` additionally evicts the
//! oldest entries down to that count.

use clap::Args;
use serde::Serialize;
use stashline_core::CacheDb;

use crate::error::CliError;

/// Parameters for the cache purge command.
#[derive(Debug, Clone, Args)]
pub struct CachePurgeParams {
    /// Keep only the N most recently stored entries.
    #[arg(long)]
    pub max_entries: Option<usize>,
}

/// Output from the cache purge command.
#[derive(Debug, Clone, Serialize)]
pub struct CachePurgeOutput {
    /// Entries removed because they had expired.
    pub expired: u64,
    /// Entries removed to respect `max_entries`.
    pub evicted: u64,
    pub remaining: u64,
}

/// Implementation of the cache purge command.
pub async fn purge_impl(cache: &CacheDb, params: CachePurgeParams) -> Result<CachePurgeOutput, CliError> {
    let expired = cache.purge_expired_entries().await?;

    let evicted = match params.max_entries {
        Some(max_entries) => cache.purge_oldest_entries(max_entries).await?,
        None => 0,
    };

    let remaining = cache.count_entries().await?;
    tracing::info!(expired, evicted, remaining, "cache purged");

    Ok(CachePurgeOutput { expired, evicted, remaining })
}
