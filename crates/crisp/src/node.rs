//! The SkcNode: one peer in a shared-knowledge-cache cluster.
//!
//! The node owns all of its mutable state (clock, integrity tree, reputation,
//! hotness counters, range index, cache) and is driven through `&mut self`,
//! so inbound resolution and local updates never interleave.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crisp_core::payload::{
    range_key, AdapterPayload, EthicsPayload, LightweightPayload, MicroBroadcastPayload,
    PartitionPayload, ProvenancePayload, SynthesisPayload, SyncPayload, TracePayload,
    ValidationPayload,
};
use crisp_core::quorum::{self, QuorumPolicy};
use crisp_core::{
    now_millis, CodecError, Ed25519PublicKey, ErrorCode, IntegrityTree, Keypair, MerkleDigest,
    NodeId, Packet, PacketHeader, PacketKind, Priority, VectorClock,
};
use crisp_store::{DeadlockRecord, EvictionCache, RangeIndex, SyncStore};
use crisp_sync::resolver::sync_body;
use crisp_sync::{ConflictResolver, Outcome, ReputationTable, SendQueue};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::peers::PeerDirectory;

/// Sync interval when most neighbors are alive.
pub const FAST_SYNC_INTERVAL: Duration = Duration::from_secs(1);
/// Sync interval otherwise.
pub const SLOW_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Fraction of neighbors that must send beacons for the fast interval.
const BEACON_QUORUM: f64 = 0.7;

/// A CRISP peer.
pub struct SkcNode<S: SyncStore, Q: SendQueue> {
    id: NodeId,
    keypair: Keypair,
    config: NodeConfig,
    quorum: QuorumPolicy,
    store: S,
    queue: Q,
    peers: PeerDirectory,
    neighbors: Vec<NodeId>,
    cluster_leaders: Vec<NodeId>,
    clock: VectorClock,
    tree: IntegrityTree,
    reputation: ReputationTable,
    access_counts: HashMap<String, u32>,
    index: RangeIndex<Vec<Bytes>>,
    cache: EvictionCache<String, Vec<Bytes>>,
    beacons: HashSet<NodeId>,
    sync_interval: Duration,
}

impl<S: SyncStore, Q: SendQueue> SkcNode<S, Q> {
    /// Create a node. Its own key is registered in its peer directory.
    pub fn new(id: NodeId, keypair: Keypair, store: S, queue: Q, config: NodeConfig) -> Self {
        let mut peers = PeerDirectory::new();
        peers.insert(id.clone(), keypair.public_key());

        let mut reputation = ReputationTable::new();
        reputation.set(id.clone(), 1.0);

        Self {
            clock: VectorClock::with_max_entries(id.clone(), config.max_clock_entries),
            cache: EvictionCache::new(config.cache_capacity),
            quorum: config.quorum_policy(),
            id,
            keypair,
            config,
            store,
            queue,
            peers,
            neighbors: Vec::new(),
            cluster_leaders: Vec::new(),
            tree: IntegrityTree::new(),
            reputation,
            access_counts: HashMap::new(),
            index: RangeIndex::new(),
            beacons: HashSet::new(),
            sync_interval: FAST_SYNC_INTERVAL,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Current integrity root over every entry synced by this node.
    pub fn root(&self) -> MerkleDigest {
        self.tree.root()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Topology
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_neighbor(&mut self, node: NodeId) {
        if !self.neighbors.contains(&node) {
            self.neighbors.push(node);
        }
    }

    pub fn add_cluster_leader(&mut self, node: NodeId) {
        if !self.cluster_leaders.contains(&node) {
            self.cluster_leaders.push(node);
        }
    }

    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    /// Register a peer's public key.
    pub fn add_peer(&mut self, node: NodeId, key: Ed25519PublicKey) {
        self.peers.insert(node, key);
    }

    /// Set the expected co-signers, in signing order.
    pub fn set_cosigners(&mut self, cosigners: Vec<NodeId>) {
        self.peers.set_cosigners(cosigners);
    }

    pub fn set_reputation(&mut self, node: NodeId, weight: f64) {
        self.reputation.set(node, weight);
    }

    /// Register that `node` votes for the packet with `sequence`.
    pub fn cast_vote(&self, node: &NodeId, sequence: u64) -> Result<()> {
        self.store.record_vote(node, sequence)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Liveness
    // ─────────────────────────────────────────────────────────────────────────

    /// Note a liveness beacon from `node`.
    pub fn record_beacon(&mut self, node: NodeId) {
        self.beacons.insert(node);
    }

    /// Pick the sync interval from neighbor liveness and return it.
    pub fn adjust_sync_interval(&mut self) -> Duration {
        let alive = self
            .neighbors
            .iter()
            .filter(|n| self.beacons.contains(*n))
            .count();
        self.sync_interval = if alive as f64 > self.neighbors.len() as f64 * BEACON_QUORUM {
            FAST_SYNC_INTERVAL
        } else {
            SLOW_SYNC_INTERVAL
        };
        debug!(alive, neighbors = self.neighbors.len(), interval = ?self.sync_interval, "sync interval adjusted");
        self.sync_interval
    }

    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hotness
    // ─────────────────────────────────────────────────────────────────────────

    /// Times the range `start:end` has been synced locally.
    pub fn access_count(&self, start: u64, end: u64) -> u32 {
        self.access_counts
            .get(&range_key(start, end))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the range is in the hot-range cache.
    pub fn is_cached(&self, start: u64, end: u64) -> bool {
        self.cache.contains(&range_key(start, end))
    }

    /// Cached entries for a hot range, refreshing its recency.
    pub fn cached_entries(&mut self, start: u64, end: u64) -> Option<&[Bytes]> {
        self.cache.get(&range_key(start, end)).map(Vec::as_slice)
    }

    /// Entries last synced for ranges starting at `start`.
    pub fn indexed_entries(&self, start: u64) -> Option<&[Bytes]> {
        self.index.search(start).map(Vec::as_slice)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Sync a range of entries to the cluster.
    ///
    /// Updates the clock, integrity tree, range index, and hotness counters,
    /// then signs, stores, and gossips the sync packet.
    pub async fn sync_range<E: AsRef<[u8]>>(
        &mut self,
        start: u64,
        end: u64,
        entries: &[E],
        priority: Priority,
    ) -> Result<Packet> {
        let entry_count = u16::try_from(entries.len()).map_err(|_| CodecError::FieldTooLong {
            field: "entry count",
            len: entries.len(),
            max: u16::MAX as usize,
        })?;

        if self.config.use_vector_clocks {
            self.clock.tick();
        }
        for entry in entries {
            self.tree.add_leaf(entry.as_ref());
        }

        let owned: Vec<Bytes> = entries
            .iter()
            .map(|e| Bytes::copy_from_slice(e.as_ref()))
            .collect();
        self.index.insert(start, owned.clone());

        let key = range_key(start, end);
        let count = self.access_counts.entry(key.clone()).or_insert(0);
        *count += 1;
        let priority = if *count > self.config.hot_access_threshold {
            debug!(range = %key, accesses = *count, "range is hot");
            self.cache.put(key, owned);
            Priority::HOT
        } else {
            priority
        };

        let clock = if self.config.use_vector_clocks {
            self.clock.encode()
        } else {
            Bytes::new()
        };

        let body = SyncPayload {
            version: self.config.protocol_version,
            priority,
            entry_count,
            range_start: start,
            range_end: end,
            digest: self.tree.root(),
            clock,
        };
        let packet = self.sign_body(PacketKind::FullSync, body.encode()?)?;

        self.store
            .put_sync_record(&self.id, body.version, &packet.encode())?;
        let delivered = self.gossip(&packet).await;
        info!(range = %body.range_key(), seq = packet.sequence(), entries = entry_count, delivered, "synced range");
        Ok(packet)
    }

    /// Send a packet to the gossip targets.
    ///
    /// Targets are the cluster leaders when hierarchical gossip is on and
    /// leaders are known, otherwise the neighbors. Returns how many sends
    /// succeeded. Failures to record or send for one target are logged and
    /// the remaining targets still get the packet.
    pub async fn gossip(&self, packet: &Packet) -> usize {
        let targets: &[NodeId] =
            if self.config.use_hierarchical_gossip && !self.cluster_leaders.is_empty() {
                &self.cluster_leaders
            } else {
                &self.neighbors
            };

        let encoded = packet.encode();
        let version = match packet.kind() {
            PacketKind::FullSync => sync_body(packet)
                .map(|b| b.version)
                .unwrap_or(self.config.protocol_version),
            _ => self.config.protocol_version,
        };
        let priority = dispatch_priority(packet);

        let mut delivered = 0;
        for target in targets {
            if let Err(err) = self.store.put_sync_record(target, version, &encoded) {
                warn!(peer = %target, error = %err, "failed to record gossip");
            }
            match self.queue.send(target, priority, encoded.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!(peer = %target, error = %err, "gossip send failed"),
            }
        }
        debug!(seq = packet.sequence(), targets = targets.len(), delivered, "gossiped");
        delivered
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Handle bytes received from `from` now.
    ///
    /// Returns the response sent back, if any. Never fails: problems are
    /// answered with error packets or logged.
    pub async fn receive(&mut self, from: &NodeId, bytes: &[u8]) -> Option<Packet> {
        let now = now_millis();
        self.receive_at(from, bytes, now, now).await
    }

    /// Handle bytes that arrived at `received_at` and are resolved at `now`.
    ///
    /// Hosts that buffer inbound traffic pass the arrival time so packets
    /// that waited past the expiry threshold are reported as deadlocked.
    pub async fn receive_at(
        &mut self,
        from: &NodeId,
        bytes: &[u8],
        received_at: i64,
        now: i64,
    ) -> Option<Packet> {
        let packet = match Packet::decode_at(bytes, received_at) {
            Ok(packet) => packet,
            Err(err) => {
                let header = PacketHeader::parse(bytes).ok();
                if header.map(|h| h.kind) == Some(PacketKind::ErrorResponse) {
                    warn!(peer = %from, error = %err, "dropping undecodable error response");
                    return None;
                }
                let (seq, type_id) = header
                    .map(|h| (u64::from(h.sequence), h.kind.to_u8()))
                    .unwrap_or((0, bytes.first().copied().unwrap_or(0)));
                warn!(peer = %from, seq, error = %err, "rejecting undecodable packet");
                let response = Packet::error_response(seq, type_id, err.error_code(), &err.to_string());
                return self.respond(from, response).await;
            }
        };

        if self.config.verify_signatures && packet.kind().is_signed() {
            if let Some(message) = self.authorize(from, &packet) {
                warn!(peer = %from, seq = packet.sequence(), reason = message, "unauthorized update");
                let response = Packet::error_response(
                    packet.sequence(),
                    packet.type_id(),
                    ErrorCode::UnauthorizedUpdate,
                    message,
                );
                return self.respond(from, response).await;
            }
        }

        let resolution = {
            let resolver =
                ConflictResolver::new(&self.store, &self.id, &self.neighbors, &self.reputation)
                    .with_expiry(self.config.deadlock_expiry());
            match resolver.resolve(&packet, now) {
                Ok(resolution) => resolution,
                Err(err) => {
                    warn!(peer = %from, seq = packet.sequence(), error = %err, "resolution failed");
                    return None;
                }
            }
        };

        if matches!(resolution.outcome, Outcome::Accepted | Outcome::IncomingWon) {
            self.observe_clock(&packet);
        }

        match resolution.response {
            Some(response) => self.respond(from, response).await,
            None => None,
        }
    }

    /// Reason the packet fails authorization, if it does.
    fn authorize(&self, from: &NodeId, packet: &Packet) -> Option<&'static str> {
        let Some(slots) = self.peers.candidates_for(from) else {
            return Some("Unknown origin");
        };
        if self.quorum.verify_slots(packet, &slots) {
            None
        } else {
            Some("Unauthorized update")
        }
    }

    fn observe_clock(&mut self, packet: &Packet) {
        if !self.config.use_vector_clocks || packet.kind() != PacketKind::FullSync {
            return;
        }
        let Ok(body) = sync_body(packet) else {
            return;
        };
        if body.clock.is_empty() {
            return;
        }
        match VectorClock::decode(&body.clock) {
            Ok(remote) => {
                let relation = self.clock.compare(&remote);
                debug!(seq = packet.sequence(), ?relation, "observed remote clock");
                self.clock.observe(&remote);
            }
            Err(err) => debug!(error = %err, "ignoring unreadable vector clock"),
        }
    }

    async fn respond(&self, to: &NodeId, response: Packet) -> Option<Packet> {
        let priority = dispatch_priority(&response);
        if let Err(err) = self.queue.send(to, priority, response.encode()).await {
            warn!(peer = %to, error = %err, "failed to send response");
        }
        Some(response)
    }

    /// Every deadlock recorded so far.
    pub fn deadlocks(&self) -> Result<Vec<DeadlockRecord>> {
        Ok(self.store.deadlocks()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signed Builders
    // ─────────────────────────────────────────────────────────────────────────

    fn sign_body(&self, kind: PacketKind, body: Bytes) -> Result<Packet> {
        let packet = Packet::builder(kind)
            .checksum_kind(self.config.checksum_kind)
            .payload(body)
            .build()?;
        Ok(quorum::sign(&packet, &self.keypair)?)
    }

    /// Add this node's signature to a packet signed by someone else.
    pub fn co_sign(&self, packet: &Packet) -> Result<Packet> {
        Ok(quorum::co_sign(packet, &self.keypair)?)
    }

    /// Entry synthesized from several sources (0x69).
    pub fn synthesize_knowledge(&self, source_ids: &[u64], entry: &[u8]) -> Result<Packet> {
        let body = SynthesisPayload {
            version: self.config.protocol_version,
            source_ids: source_ids.to_vec(),
            entry: Bytes::copy_from_slice(entry),
        };
        self.sign_body(PacketKind::KnowledgeSynthesis, body.encode()?)
    }

    /// Schema validation result (0x6A).
    pub fn validate_semantics(&self, entry_id: u64, schema_id: u64, result: u8) -> Result<Packet> {
        let body = ValidationPayload {
            entry_id,
            schema_id,
            result,
        };
        self.sign_body(PacketKind::SemanticValidation, body.encode())
    }

    /// Partition directory update (0x6B).
    pub fn update_partition_directory(&self, assignments: &[(u64, NodeId)]) -> Result<Packet> {
        let body = PartitionPayload {
            version: self.config.protocol_version,
            assignments: assignments.to_vec(),
        };
        self.sign_body(PacketKind::PartitionDirectory, body.encode()?)
    }

    /// Reasoning trace for an entry (0x6C).
    pub fn share_reasoning_trace(&self, entry_id: u64, trace: &str) -> Result<Packet> {
        let body = TracePayload {
            entry_id,
            trace: trace.to_string(),
        };
        self.sign_body(PacketKind::ReasoningTrace, body.encode()?)
    }

    /// Urgent micro update for a range (0x6D). The entry is cut or padded
    /// to eight bytes.
    pub fn priority_broadcast(&self, start: u64, end: u64, micro_entry: &[u8]) -> Result<Packet> {
        let body = MicroBroadcastPayload {
            version: self.config.protocol_version,
            range_start: start,
            range_end: end,
            micro_entry: MicroBroadcastPayload::fit_entry(micro_entry),
        };
        self.sign_body(PacketKind::PriorityBroadcast, body.encode())
    }

    /// Alignment score and safety flag (0x6E).
    pub fn ethics_check(&self, entry_id: u64, alignment_score: f32, safety_flag: u8) -> Result<Packet> {
        let body = EthicsPayload {
            entry_id,
            alignment_score,
            safety_flag,
        };
        self.sign_body(PacketKind::EthicsCheck, body.encode())
    }

    /// Wrap a foreign protocol's payload (0x6F).
    pub fn adapter_packet(&self, protocol: &str, inner: &[u8]) -> Result<Packet> {
        let body = AdapterPayload {
            protocol: protocol.to_string(),
            inner: Bytes::copy_from_slice(inner),
        };
        self.sign_body(PacketKind::ProtocolAdapter, body.encode()?)
    }

    /// Fingerprint-only sync for constrained links (0x70).
    pub fn lightweight_sync<E: AsRef<[u8]>>(
        &self,
        start: u64,
        end: u64,
        entries: &[E],
    ) -> Result<Packet> {
        let body = LightweightPayload {
            version: self.config.protocol_version,
            range_start: start,
            range_end: end,
            fingerprint: LightweightPayload::fingerprint_of(entries),
        };
        self.sign_body(PacketKind::LightweightSync, body.encode())
    }

    /// Causal provenance of an entry (0x50).
    pub fn add_provenance(&self, entry_id: u64, causal_chain: &str) -> Result<Packet> {
        let body = ProvenancePayload {
            entry_id,
            causal_chain: causal_chain.to_string(),
        };
        self.sign_body(PacketKind::Provenance, body.encode()?)
    }
}

impl<S: SyncStore, Q: SendQueue> std::fmt::Debug for SkcNode<S, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkcNode")
            .field("id", &self.id)
            .field("neighbors", &self.neighbors)
            .field("cluster_leaders", &self.cluster_leaders)
            .field("clock", &self.clock.entries())
            .finish_non_exhaustive()
    }
}

/// Queue priority for an outbound packet.
pub fn dispatch_priority(packet: &Packet) -> Priority {
    match packet.kind() {
        PacketKind::PriorityBroadcast => Priority::URGENT,
        PacketKind::FullSync => sync_body(packet)
            .map(|body| body.priority)
            .unwrap_or(Priority::NORMAL),
        PacketKind::ErrorResponse => Priority::ELEVATED,
        _ => Priority::NORMAL,
    }
}
