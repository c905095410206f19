//! Schema migrations for the entry store.
//!
//! The applied schema version lives in SQLite's `user_version` pragma.
//! Each pending migration runs in its own transaction together with the
//! version bump, so a failed migration leaves the previous version intact.

use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::TransactionBehavior;

use super::Error;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version, strictly increasing.
const MIGRATIONS: &[Migration] =
    &[Migration { version: 1, name: "entries", sql: include_str!("../../migrations/001_entries.sql") }];

/// Latest schema version known to this build.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Apply every migration newer than the database's current version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` if the database is newer than this
/// build, or a database error if a migration batch fails.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current > latest_version() {
            return Err(Error::MigrationFailed(format!(
                "database schema version {current} is newer than supported version {}",
                latest_version()
            )));
        }

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::MigrationFailed(format!("{} ({}): {e}", migration.name, migration.version)))?;
            tx.pragma_update(None, "user_version", migration.version)?;
            tx.commit()?;
            tracing::debug!(version = migration.version, name = migration.name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
