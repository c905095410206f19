//! Entry CRUD operations on the SQLite store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row};

use super::connection::CacheDb;
use super::entry::{CacheEntry, CacheStore};
use crate::Error;

/// Raw column values, decoded outside the row callback so that timestamp and
/// JSON failures surface as `CorruptEntry` rather than SQLite errors.
struct EntryRow {
    key: String,
    data: Option<Vec<u8>>,
    mime_type: String,
    etag: Option<String>,
    headers_json: String,
    stored_at: String,
    expires_at: Option<String>,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            data: row.get(1)?,
            mime_type: row.get(2)?,
            etag: row.get(3)?,
            headers_json: row.get(4)?,
            stored_at: row.get(5)?,
            expires_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<CacheEntry, Error> {
        let headers: BTreeMap<String, String> = serde_json::from_str(&self.headers_json)?;
        Ok(CacheEntry {
            key: self.key,
            data: self.data,
            mime_type: self.mime_type,
            etag: self.etag,
            headers,
            stored_at: parse_timestamp(&self.stored_at)?,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Fixed-width UTC form so that SQL string comparison orders correctly.
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::CorruptEntry(format!("bad timestamp {raw:?}: {e}")))
}

impl CacheDb {
    /// Insert or replace the entry stored under `entry.key`.
    pub async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        if entry.key.is_empty() {
            return Err(Error::InvalidInput("cache key must not be empty".into()));
        }

        let headers_json = serde_json::to_string(&entry.headers)?;
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key, data, mime_type, etag, headers_json, stored_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(key) DO UPDATE SET
                        data = excluded.data,
                        mime_type = excluded.mime_type,
                        etag = excluded.etag,
                        headers_json = excluded.headers_json,
                        stored_at = excluded.stored_at,
                        expires_at = excluded.expires_at",
                    params![
                        &entry.key,
                        &entry.data,
                        &entry.mime_type,
                        &entry.etag,
                        &headers_json,
                        format_timestamp(entry.stored_at),
                        entry.expires_at.map(format_timestamp),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the entry stored under `key`, expired or not.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let row = conn
                    .query_row(
                        "SELECT key, data, mime_type, etag, headers_json, stored_at, expires_at
                         FROM entries WHERE key = ?1",
                        params![key],
                        EntryRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(EntryRow::decode).transpose()
    }

    /// Delete the entry stored under `key`. Returns whether one existed.
    pub async fn delete_entry(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries whose expiry has passed.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_entries(&self) -> Result<u64, Error> {
        let now = format_timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the entries with the oldest `stored_at` until at most
    /// `max_entries` remain. Reads do not refresh `stored_at`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_oldest_entries(&self, max_entries: usize) -> Result<u64, Error> {
        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM entries WHERE key IN (
                        SELECT key FROM entries ORDER BY stored_at ASC LIMIT ?1
                    )",
                    params![count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored entries, including expired ones.
    pub async fn count_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.get_entry(key).await
    }
}
