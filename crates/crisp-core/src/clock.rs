//! Vector clocks.
//!
//! A clock is a diagnostic summary of causal history attached to sync
//! packets. Nothing is rejected on the basis of clock comparison.
//!
//! Clocks are bounded: once more than `max_entries` nodes are tracked, the
//! entries with the lowest counters are dropped. This is lossy summarization,
//! not a merge, and two trimmed clocks may compare as `Concurrent` even when
//! the full histories were ordered. The owner's entry is never dropped.
//!
//! Wire form: `count:u32 | (node_id:[u8; 32], counter:u32)*`, ordered by
//! node id.

use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{NodeId, NODE_ID_WIRE_LEN};
use crate::wire::WireReader;

/// Default bound on tracked nodes.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Causal relation between two clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Equal,
    Before,
    After,
    Concurrent,
}

/// A vector clock owned by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorClock {
    owner: NodeId,
    counters: BTreeMap<NodeId, u32>,
    max_entries: usize,
}

impl VectorClock {
    /// Create a clock for `owner` with the default bound.
    pub fn new(owner: NodeId) -> Self {
        Self::with_max_entries(owner, DEFAULT_MAX_ENTRIES)
    }

    /// Create a clock with an explicit bound (at least 1).
    pub fn with_max_entries(owner: NodeId, max_entries: usize) -> Self {
        let mut counters = BTreeMap::new();
        counters.insert(owner.clone(), 0);
        Self {
            owner,
            counters,
            max_entries: max_entries.max(1),
        }
    }

    /// The owning node.
    pub fn owner(&self) -> &NodeId {
        &self.owner
    }

    /// Increment the owner's counter by one and return the new value.
    pub fn tick(&mut self) -> u32 {
        let counter = self.counters.entry(self.owner.clone()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Counter for `node` (0 if untracked).
    pub fn get(&self, node: &NodeId) -> u32 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no nodes are tracked. Never true for a constructed clock.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Tracked counters, ordered by node id.
    pub fn entries(&self) -> &BTreeMap<NodeId, u32> {
        &self.counters
    }

    /// Merge a peer's counters by pointwise maximum, then trim.
    pub fn observe(&mut self, other: &BTreeMap<NodeId, u32>) {
        for (node, &counter) in other {
            if node == &self.owner {
                continue;
            }
            let entry = self.counters.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
        self.trim();
    }

    /// Compare against another set of counters.
    pub fn compare(&self, other: &BTreeMap<NodeId, u32>) -> Causality {
        let mut less = false;
        let mut greater = false;

        for node in self.counters.keys().chain(other.keys()) {
            let mine = self.get(node);
            let theirs = other.get(node).copied().unwrap_or(0);
            match mine.cmp(&theirs) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }

        match (less, greater) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (true, true) => Causality::Concurrent,
        }
    }

    /// Drop the lowest-counter entries until at most `max_entries` remain.
    ///
    /// Ties are broken by dropping the greater node id first.
    pub fn trim(&mut self) {
        if self.counters.len() <= self.max_entries {
            return;
        }

        let mut candidates: Vec<(NodeId, u32)> = self
            .counters
            .iter()
            .filter(|(node, _)| *node != &self.owner)
            .map(|(node, counter)| (node.clone(), *counter))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

        let excess = self.counters.len() - self.max_entries;
        for (node, _) in candidates.into_iter().take(excess) {
            self.counters.remove(&node);
        }
    }

    /// Trim, then serialize.
    pub fn encode(&mut self) -> Bytes {
        self.trim();

        let mut buf = BytesMut::with_capacity(4 + self.counters.len() * (NODE_ID_WIRE_LEN + 4));
        buf.put_u32(self.counters.len() as u32);
        for (node, counter) in &self.counters {
            buf.put_slice(&node.to_wire());
            buf.put_u32(*counter);
        }
        buf.freeze()
    }

    /// Parse the wire form back into counters.
    pub fn decode(bytes: &[u8]) -> Result<BTreeMap<NodeId, u32>> {
        let mut reader = WireReader::new(bytes);
        let count = reader.u32("clock count")?;

        let mut counters = BTreeMap::new();
        for _ in 0..count {
            let node = NodeId::from_wire(&reader.array::<NODE_ID_WIRE_LEN>("clock node id")?);
            let counter = reader.u32("clock counter")?;
            counters.insert(node, counter);
        }
        reader.finish("vector clock")?;
        Ok(counters)
    }
}
