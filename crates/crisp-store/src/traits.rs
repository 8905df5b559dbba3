//! SyncStore trait: the state a node keeps between inbound packets.
//!
//! Three keyspaces, all keyed by plain values so implementations need no
//! knowledge of packet internals:
//!
//! - sync records: `(node, protocol_version)` → encoded packet
//! - votes: `node` → sequence of the packet that node last voted for
//! - deadlocks: `sequence` → encoded packet plus the time it was recorded

use bytes::Bytes;
use crisp_core::NodeId;

use crate::error::Result;

/// A packet that aged past the expiry threshold before it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockRecord {
    /// Sequence of the offending packet.
    pub sequence: u64,
    /// The packet as it was encoded on the wire.
    pub packet: Bytes,
    /// When the deadlock was recorded (Unix ms).
    pub recorded_at: i64,
}

/// Storage for sync records, votes, and the deadlock audit trail.
///
/// Implementations synchronize internally. Callers that read then write
/// (conflict resolution) serialize those steps themselves.
pub trait SyncStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Sync Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Store the encoded packet for `(node, version)`, replacing any previous.
    fn put_sync_record(&self, node: &NodeId, version: u32, packet: &[u8]) -> Result<()>;

    /// Fetch the encoded packet stored for `(node, version)`.
    fn sync_record(&self, node: &NodeId, version: u32) -> Result<Option<Bytes>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Votes
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that `node` votes for the packet with `sequence`.
    fn record_vote(&self, node: &NodeId, sequence: u64) -> Result<()>;

    /// The sequence `node` last voted for.
    fn vote(&self, node: &NodeId) -> Result<Option<u64>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Deadlocks
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a deadlocked packet. A later record for the same sequence wins.
    fn record_deadlock(&self, record: &DeadlockRecord) -> Result<()>;

    /// Fetch the deadlock recorded for `sequence`.
    fn deadlock(&self, sequence: u64) -> Result<Option<DeadlockRecord>>;

    /// All recorded deadlocks, ordered by sequence.
    fn deadlocks(&self) -> Result<Vec<DeadlockRecord>>;
}

impl<T: SyncStore + ?Sized> SyncStore for std::sync::Arc<T> {
    fn put_sync_record(&self, node: &NodeId, version: u32, packet: &[u8]) -> Result<()> {
        (**self).put_sync_record(node, version, packet)
    }

    fn sync_record(&self, node: &NodeId, version: u32) -> Result<Option<Bytes>> {
        (**self).sync_record(node, version)
    }

    fn record_vote(&self, node: &NodeId, sequence: u64) -> Result<()> {
        (**self).record_vote(node, sequence)
    }

    fn vote(&self, node: &NodeId) -> Result<Option<u64>> {
        (**self).vote(node)
    }

    fn record_deadlock(&self, record: &DeadlockRecord) -> Result<()> {
        (**self).record_deadlock(record)
    }

    fn deadlock(&self, sequence: u64) -> Result<Option<DeadlockRecord>> {
        (**self).deadlock(sequence)
    }

    fn deadlocks(&self) -> Result<Vec<DeadlockRecord>> {
        (**self).deadlocks()
    }
}
