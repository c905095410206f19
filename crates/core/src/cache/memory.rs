//! In-process cache store.
//!
//! A `HashMap` behind a tokio `RwLock`. Nothing is persisted; entries live
//! as long as the store does.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entry::{CacheEntry, CacheStore};
use crate::Error;

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under its key, returning the entry it replaced.
    pub async fn insert(&self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.write().await.insert(entry.key.clone(), entry)
    }

    pub async fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.entries.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        Ok(self.entries.read().await.get(key).cloned())
    }
}
