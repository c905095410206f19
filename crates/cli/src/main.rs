//! stashline command-line entry point.
//!
//! Runs cache-aware HTTP calls and maintains the SQLite response cache.
//! Command output is JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use stashline_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

use commands::cache::{CacheDeleteParams, CacheGetParams, CachePurgeParams, CachePutParams};
use commands::{FetchParams, Session};

/// Cache-aware HTTP client backed by a SQLite response cache.
#[derive(Debug, Parser)]
#[command(name = "stashline", version)]
struct Cli {
    /// Cache database path (overrides STASHLINE_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a request, honoring its cache mode.
    Fetch(FetchParams),

    /// Inspect and maintain the response cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Show the entry stored under a URL.
    Get(CacheGetParams),
    /// Store a body under a URL.
    Put(CachePutParams),
    /// Remove the entry stored under a URL.
    Delete(CacheDeleteParams),
    /// Drop expired entries and optionally cap the entry count.
    Purge(CachePurgeParams),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    tracing::debug!(db_path = %config.db_path.display(), "configuration loaded");

    let mut session = Session::open(config).await?;
    let json = run(&mut session, cli.command).await?;
    println!("{json}");

    Ok(())
}

async fn run(session: &mut Session, command: Command) -> Result<String, error::CliError> {
    match command {
        Command::Fetch(params) => render(&commands::fetch_impl(session, params).await?),
        Command::Cache(CacheCommand::Get(params)) => render(&commands::cache::get_impl(&session.db, params).await?),
        Command::Cache(CacheCommand::Put(params)) => {
            let ttl = session.config.default_ttl();
            render(&commands::cache::put_impl(&session.db, ttl, params).await?)
        }
        Command::Cache(CacheCommand::Delete(params)) => {
            render(&commands::cache::delete_impl(&session.db, params).await?)
        }
        Command::Cache(CacheCommand::Purge(params)) => render(&commands::cache::purge_impl(&session.db, params).await?),
    }
}

fn render(output: &impl Serialize) -> Result<String, error::CliError> {
    Ok(serde_json::to_string_pretty(output)?)
}
