//! `cache delete` command.

use clap::Args;
use serde::Serialize;
use stashline_core::CacheDb;

use crate::error::CliError;

/// Parameters for the cache delete command.
#[derive(Debug, Clone, Args)]
pub struct CacheDeleteParams {
    /// URL the entry is stored under.
    pub url: String,
}

/// Output from the cache delete command.
#[derive(Debug, Clone, Serialize)]
pub struct CacheDeleteOutput {
    pub key: String,
    pub deleted: bool,
}

/// Implementation of the cache delete command.
pub async fn delete_impl(cache: &CacheDb, params: CacheDeleteParams) -> Result<CacheDeleteOutput, CliError> {
    let deleted = cache.delete_entry(&params.url).await?;
    Ok(CacheDeleteOutput { key: params.url, deleted })
}
