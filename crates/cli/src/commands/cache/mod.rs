//! Cache maintenance commands.
//!
//! These operate on the SQLite store directly; the request executor only
//! ever reads from it.

pub mod delete;
pub mod get;
pub mod purge;
pub mod put;

pub use delete::{CacheDeleteParams, delete_impl};
pub use get::{CacheGetParams, get_impl};
pub use purge::{CachePurgeParams, purge_impl};
pub use put::{CachePutParams, put_impl};
