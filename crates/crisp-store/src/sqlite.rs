//! SQLite implementation of the SyncStore trait.
//!
//! Uses rusqlite with bundled SQLite. The connection sits behind a mutex;
//! every call holds it for one statement.

use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use crisp_core::{now_millis, NodeId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{DeadlockRecord, SyncStore};

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(StoreError::poisoned)?;
        f(&conn)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

// SQLite integers are signed; sequences round-trip through a bit cast.
fn seq_to_sql(sequence: u64) -> i64 {
    sequence as i64
}

fn seq_from_sql(value: i64) -> u64 {
    value as u64
}

fn row_to_deadlock(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeadlockRecord> {
    let packet: Vec<u8> = row.get("packet")?;
    Ok(DeadlockRecord {
        sequence: seq_from_sql(row.get("sequence")?),
        packet: Bytes::from(packet),
        recorded_at: row.get("recorded_at")?,
    })
}

impl SyncStore for SqliteStore {
    fn put_sync_record(&self, node: &NodeId, version: u32, packet: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_records (node_id, version, packet, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(node_id, version) DO UPDATE SET
                    packet = excluded.packet,
                    updated_at = excluded.updated_at",
                params![node.as_str(), version, packet, now_millis()],
            )?;
            Ok(())
        })
    }

    fn sync_record(&self, node: &NodeId, version: u32) -> Result<Option<Bytes>> {
        self.with_conn(|conn| {
            let packet: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT packet FROM sync_records WHERE node_id = ?1 AND version = ?2",
                    params![node.as_str(), version],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(packet.map(Bytes::from))
        })
    }

    fn record_vote(&self, node: &NodeId, sequence: u64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO votes (node_id, sequence, cast_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(node_id) DO UPDATE SET
                    sequence = excluded.sequence,
                    cast_at = excluded.cast_at",
                params![node.as_str(), seq_to_sql(sequence), now_millis()],
            )?;
            Ok(())
        })
    }

    fn vote(&self, node: &NodeId) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            let sequence: Option<i64> = conn
                .query_row(
                    "SELECT sequence FROM votes WHERE node_id = ?1",
                    params![node.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(sequence.map(seq_from_sql))
        })
    }

    fn record_deadlock(&self, record: &DeadlockRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO deadlocks (sequence, packet, recorded_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    seq_to_sql(record.sequence),
                    record.packet.as_ref(),
                    record.recorded_at
                ],
            )?;
            Ok(())
        })
    }

    fn deadlock(&self, sequence: u64) -> Result<Option<DeadlockRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT sequence, packet, recorded_at FROM deadlocks WHERE sequence = ?1",
                params![seq_to_sql(sequence)],
                row_to_deadlock,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn deadlocks(&self) -> Result<Vec<DeadlockRecord>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT sequence, packet, recorded_at FROM deadlocks")?;
            let mut records = stmt
                .query_map([], row_to_deadlock)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            // Ordered as unsigned; large sequences are negative in SQLite.
            records.sort_by_key(|r| r.sequence);
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_record_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let node = NodeId::new("node1");

        assert!(store.sync_record(&node, 1).unwrap().is_none());
        store.put_sync_record(&node, 1, b"first").unwrap();
        store.put_sync_record(&node, 1, b"second").unwrap();
        assert_eq!(
            store.sync_record(&node, 1).unwrap().as_deref(),
            Some(&b"second"[..])
        );
    }

    #[test]
    fn test_vote_with_large_sequence() {
        let store = SqliteStore::open_memory().unwrap();
        let node = NodeId::new("voter");
        store.record_vote(&node, u64::MAX - 1).unwrap();
        assert_eq!(store.vote(&node).unwrap(), Some(u64::MAX - 1));
    }

    #[test]
    fn test_deadlocks_sorted_unsigned() {
        let store = SqliteStore::open_memory().unwrap();
        for seq in [u64::MAX, 5, 1 << 40] {
            store
                .record_deadlock(&DeadlockRecord {
                    sequence: seq,
                    packet: Bytes::from_static(b"pkt"),
                    recorded_at: 42,
                })
                .unwrap();
        }
        let seqs: Vec<u64> = store
            .deadlocks()
            .unwrap()
            .into_iter()
            .map(|r| r.sequence)
            .collect();
        assert_eq!(seqs, vec![5, 1 << 40, u64::MAX]);
        assert_eq!(store.deadlock(5).unwrap().unwrap().packet.as_ref(), b"pkt");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crisp.db");
        let node = NodeId::new("node1");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_sync_record(&node, 3, b"kept").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.sync_record(&node, 3).unwrap().as_deref(),
            Some(&b"kept"[..])
        );
    }
}
