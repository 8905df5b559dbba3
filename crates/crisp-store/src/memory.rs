//! In-memory implementation of the SyncStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use bytes::Bytes;
use crisp_core::NodeId;

use crate::error::{Result, StoreError};
use crate::traits::{DeadlockRecord, SyncStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// (node, version) -> encoded packet.
    sync_records: HashMap<(NodeId, u32), Bytes>,

    /// node -> voted sequence.
    votes: HashMap<NodeId, u64>,

    /// Deadlocks ordered by sequence.
    deadlocks: BTreeMap<u64, DeadlockRecord>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryStoreInner) -> T) -> Result<T> {
        let inner = self.inner.read().map_err(StoreError::poisoned)?;
        Ok(f(&inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemoryStoreInner) -> T) -> Result<T> {
        let mut inner = self.inner.write().map_err(StoreError::poisoned)?;
        Ok(f(&mut inner))
    }
}

impl SyncStore for MemoryStore {
    fn put_sync_record(&self, node: &NodeId, version: u32, packet: &[u8]) -> Result<()> {
        let key = (node.clone(), version);
        let value = Bytes::copy_from_slice(packet);
        self.write(|inner| {
            inner.sync_records.insert(key, value);
        })
    }

    fn sync_record(&self, node: &NodeId, version: u32) -> Result<Option<Bytes>> {
        let key = (node.clone(), version);
        self.read(|inner| inner.sync_records.get(&key).cloned())
    }

    fn record_vote(&self, node: &NodeId, sequence: u64) -> Result<()> {
        self.write(|inner| {
            inner.votes.insert(node.clone(), sequence);
        })
    }

    fn vote(&self, node: &NodeId) -> Result<Option<u64>> {
        self.read(|inner| inner.votes.get(node).copied())
    }

    fn record_deadlock(&self, record: &DeadlockRecord) -> Result<()> {
        self.write(|inner| {
            inner.deadlocks.insert(record.sequence, record.clone());
        })
    }

    fn deadlock(&self, sequence: u64) -> Result<Option<DeadlockRecord>> {
        self.read(|inner| inner.deadlocks.get(&sequence).cloned())
    }

    fn deadlocks(&self) -> Result<Vec<DeadlockRecord>> {
        self.read(|inner| inner.deadlocks.values().cloned().collect())
    }
}
