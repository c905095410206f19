//! Response cache stores.
//!
//! This module provides the read interface the request executor consumes
//! (`CacheStore`) and two stores implementing it:
//!
//! - `CacheDb`: persistent SQLite store with async access via tokio-rusqlite,
//!   WAL mode for concurrent readers, versioned migrations, and purge
//!   strategies (expired, oldest-first)
//! - `MemoryCache`: in-process map, useful for tests and short-lived tools
//!
//! Entries are keyed by the request URL verbatim.

pub mod connection;
pub mod entries;
pub mod entry;
pub mod memory;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entry::{CacheEntry, CacheStore};
pub use memory::MemoryCache;
