//! CLI command implementations.
//!
//! Each command takes clap-parsed params and returns a serializable output
//! that `main` prints as JSON.

pub mod cache;
pub mod fetch;

pub use fetch::{FetchParams, fetch_impl};

use std::sync::Arc;

use stashline_client::{Client, ClientBuilder, HomeQueue};
use stashline_core::config::MAX_TTL_SECS;
use stashline_core::{AppConfig, CacheDb};

use crate::error::CliError;

/// Everything a command needs: config, the cache database, and a client
/// reading from that database.
pub struct Session {
    pub config: AppConfig,
    pub db: CacheDb,
    pub client: Client,
    pub home: HomeQueue,
}

impl Session {
    /// Open the cache database named by `config` and build a client over it.
    pub async fn open(config: AppConfig) -> Result<Self, CliError> {
        let db = CacheDb::open(config.require_db_path()?).await?;
        let (client, home) = ClientBuilder::from_config(&config).cache(Arc::new(db.clone())).build()?;
        Ok(Self { config, db, client, home })
    }
}

/// Entry lifetime from a `--ttl-secs` value.
pub fn ttl_from_secs(secs: u64) -> Result<chrono::Duration, CliError> {
    if secs > MAX_TTL_SECS {
        return Err(CliError::InvalidInput(format!("--ttl-secs must not exceed {MAX_TTL_SECS}, got {secs}")));
    }
    chrono::Duration::try_seconds(secs as i64)
        .ok_or_else(|| CliError::InvalidInput(format!("--ttl-secs out of range: {secs}")))
}
