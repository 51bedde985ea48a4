//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::now_millis;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Identity records, stored verbatim
        CREATE TABLE identities (
            merkle_root BLOB PRIMARY KEY,     -- 32 bytes, content hash of the record
            record_id TEXT NOT NULL,          -- DBC-xxxxxxxxxxxxxxxx
            agent_name TEXT NOT NULL,
            custodian_id TEXT NOT NULL,
            parent BLOB,                      -- 32 bytes, nullable (None for roots)
            document TEXT NOT NULL,           -- wire JSON
            inserted_at INTEGER NOT NULL      -- local timestamp of insertion
        );

        -- Ledger entries, one row per position
        CREATE TABLE entries (
            identity BLOB NOT NULL REFERENCES identities(merkle_root),
            seq INTEGER NOT NULL,             -- 0-based position in the ledger
            entry_hash BLOB NOT NULL,         -- 32 bytes
            previous_hash BLOB,               -- 32 bytes, nullable (None for genesis)
            event_type TEXT NOT NULL,
            document TEXT NOT NULL,           -- wire JSON
            appended_at INTEGER NOT NULL,

            PRIMARY KEY (identity, seq)
        );

        CREATE INDEX idx_identities_parent ON identities(parent);
        CREATE INDEX idx_entries_hash ON entries(entry_hash);
        CREATE INDEX idx_entries_event_type ON entries(event_type);
        "#,
    )?;

    Ok(())
}
