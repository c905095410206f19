//! Core types and shared functionality for stashline.
//!
//! This crate provides:
//! - The cache-store interface and its SQLite and in-memory stores
//! - Unified error types
//! - Layered application configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CacheStore, MemoryCache};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
