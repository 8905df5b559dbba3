//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that moves the schema from version N to N+1.
//! Applied versions are tracked in `schema_migrations`.

use rusqlite::Connection;

use crisp_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
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
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: sync records, votes, deadlock audit.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Last packet seen per (node, protocol version)
        CREATE TABLE sync_records (
            node_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            packet BLOB NOT NULL,             -- encoded packet, header included
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (node_id, version)
        );

        -- One vote per node: the sequence it backs
        CREATE TABLE votes (
            node_id TEXT PRIMARY KEY,
            sequence INTEGER NOT NULL,        -- u64 stored as two's complement i64
            cast_at INTEGER NOT NULL
        );

        -- Packets that expired before resolution
        CREATE TABLE deadlocks (
            sequence INTEGER PRIMARY KEY,     -- u64 stored as two's complement i64
            packet BLOB NOT NULL,
            recorded_at INTEGER NOT NULL
        );

        CREATE INDEX idx_deadlocks_recorded ON deadlocks(recorded_at);
        "#,
    )?;

    Ok(())
}
