//! Conflict and deadlock resolution for inbound packets.
//!
//! Each inbound packet passes through a one-shot state machine:
//!
//! ```text
//! Parse ──► Lookup ──► Compare ──► Conflict (vote)
//!   │          │           │
//!   │          └─absent────┴─equal──► Deadlock check ──► Accept
//!   └─ non-sync kinds ──────────────►       │
//!                                           └─expired──► DeadlockTimeout
//! ```
//!
//! Error responses are never answered. Only full-sync packets carry a
//! digest, so only they can conflict.

use std::time::Duration;

use crisp_core::payload::SyncPayload;
use crisp_core::{CodecError, ErrorCode, NodeId, Packet, PacketBody, PacketKind, SignedPayload};
use crisp_store::{DeadlockRecord, SyncStore};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::reputation::ReputationTable;

/// Default age after which an unresolved packet counts as deadlocked.
pub const DEFAULT_DEADLOCK_EXPIRY: Duration = Duration::from_millis(5000);

/// What happened to an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Consumed without reply (error responses).
    Ignored,
    /// Accepted; full-sync packets were stored.
    Accepted,
    /// Won a conflict vote and replaced the stored record.
    IncomingWon,
    /// Lost a conflict vote; the stored packet is sent back.
    StoredWon,
    /// Rejected with the given error code.
    Rejected(ErrorCode),
    /// Aged past the expiry threshold; recorded for audit.
    Deadlocked,
}

/// Outcome plus the packet, if any, to send back to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub response: Option<Packet>,
}

impl Resolution {
    fn silent(outcome: Outcome) -> Self {
        Self {
            outcome,
            response: None,
        }
    }

    fn reject(packet: &Packet, code: ErrorCode, message: &str) -> Self {
        Self {
            outcome: Outcome::Rejected(code),
            response: Some(Packet::error_response(
                packet.sequence(),
                packet.type_id(),
                code,
                message,
            )),
        }
    }

    fn malformed(packet: &Packet, err: &CodecError) -> Self {
        warn!(seq = packet.sequence(), type_id = packet.type_id(), error = %err, "malformed packet");
        Self::reject(packet, ErrorCode::MalformedPacket, "Invalid packet format")
    }
}

/// Reputation-weighted vote tallies for a set of contending packets.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteTally {
    /// Weight per candidate, in candidate order.
    pub weights: Vec<f64>,
    /// Number of neighbors whose vote named some candidate.
    pub votes: usize,
}

impl VoteTally {
    /// Index of the winning candidate; ties go to the earliest.
    /// `None` if nobody voted.
    pub fn winner(&self) -> Option<usize> {
        if self.votes == 0 {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (i, &w) in self.weights.iter().enumerate() {
            match best {
                Some((_, bw)) if w <= bw => {}
                _ => best = Some((i, w)),
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Decides the fate of inbound packets against stored state.
///
/// Borrows everything it reads; the caller holds exclusive access for the
/// duration of one `resolve`.
pub struct ConflictResolver<'a, S: SyncStore + ?Sized> {
    store: &'a S,
    local_node: &'a NodeId,
    neighbors: &'a [NodeId],
    reputation: &'a ReputationTable,
    expiry: Duration,
}

impl<'a, S: SyncStore + ?Sized> ConflictResolver<'a, S> {
    pub fn new(
        store: &'a S,
        local_node: &'a NodeId,
        neighbors: &'a [NodeId],
        reputation: &'a ReputationTable,
    ) -> Self {
        Self {
            store,
            local_node,
            neighbors,
            reputation,
            expiry: DEFAULT_DEADLOCK_EXPIRY,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Run one inbound packet through the state machine at time `now`.
    pub fn resolve(&self, packet: &Packet, now: i64) -> Result<Resolution> {
        let kind = packet.kind();
        match kind {
            PacketKind::ErrorResponse => {
                debug!(seq = packet.sequence(), "error response consumed");
                return Ok(Resolution::silent(Outcome::Ignored));
            }
            PacketKind::Unknown(id) => {
                let err = CodecError::MalformedPacket(format!("unknown packet type 0x{:02x}", id));
                return Ok(Resolution::malformed(packet, &err));
            }
            _ => {}
        }

        let body = match SignedPayload::parse(packet.payload())
            .and_then(|signed| PacketBody::parse_body(kind, signed.body()))
        {
            Ok(body) => body,
            Err(err) => return Ok(Resolution::malformed(packet, &err)),
        };

        match body {
            PacketBody::FullSync(sync) => self.check_conflict(packet, &sync, now),
            _ => self.check_deadlock(packet, None, now),
        }
    }

    fn check_conflict(&self, incoming: &Packet, sync: &SyncPayload, now: i64) -> Result<Resolution> {
        let Some(stored_bytes) = self.store.sync_record(self.local_node, sync.version)? else {
            return self.check_deadlock(incoming, Some(sync.version), now);
        };

        let (stored, stored_sync) = match Packet::decode(&stored_bytes)
            .and_then(|p| sync_body(&p).map(|body| (p, body)))
        {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(version = sync.version, error = %err, "stored sync record is unreadable");
                return Ok(Resolution::reject(
                    incoming,
                    ErrorCode::MalformedPacket,
                    "Invalid stored packet",
                ));
            }
        };

        if stored_sync.digest != sync.digest {
            debug!(
                version = sync.version,
                incoming = ?sync.digest,
                stored = ?stored_sync.digest,
                "digest mismatch"
            );
            return self.vote_between(incoming, &stored, sync.version);
        }

        self.check_deadlock(incoming, Some(sync.version), now)
    }

    /// Settle two full-sync packets for the same version by vote.
    pub fn resolve_semantic_conflict(&self, incoming: &Packet, stored: &Packet) -> Result<Resolution> {
        match sync_body(incoming) {
            Ok(sync) => self.vote_between(incoming, stored, sync.version),
            Err(err) => Ok(Resolution::malformed(incoming, &err)),
        }
    }

    fn vote_between(&self, incoming: &Packet, stored: &Packet, version: u32) -> Result<Resolution> {
        let tally = self.collect_votes(&[incoming, stored])?;

        match tally.winner() {
            None => {
                warn!(seq = incoming.sequence(), version, "conflict unresolved: no votes");
                Ok(Resolution::reject(
                    incoming,
                    ErrorCode::VersionConflict,
                    "Conflict unresolved",
                ))
            }
            Some(0) => {
                self.store
                    .put_sync_record(self.local_node, version, &incoming.encode())?;
                info!(seq = incoming.sequence(), version, weights = ?tally.weights, "conflict resolved for incoming");
                Ok(Resolution::silent(Outcome::IncomingWon))
            }
            Some(_) => {
                info!(seq = stored.sequence(), version, weights = ?tally.weights, "conflict resolved for stored");
                Ok(Resolution {
                    outcome: Outcome::StoredWon,
                    response: Some(stored.clone()),
                })
            }
        }
    }

    /// Tally neighbor votes for each candidate, weighted by reputation.
    ///
    /// Votes match on the low 32 bits, the part of a sequence the header
    /// carries.
    pub fn collect_votes(&self, candidates: &[&Packet]) -> Result<VoteTally> {
        let mut weights = vec![0.0; candidates.len()];
        let mut votes = 0;

        for node in self.neighbors {
            let Some(voted) = self.store.vote(node)? else {
                continue;
            };
            let weight = self.reputation.weight(node);
            let mut counted = false;
            for (slot, candidate) in weights.iter_mut().zip(candidates) {
                if candidate.wire_sequence() == voted as u32 {
                    *slot += weight;
                    counted = true;
                }
            }
            if counted {
                votes += 1;
            }
        }

        Ok(VoteTally { weights, votes })
    }

    fn check_deadlock(&self, packet: &Packet, version: Option<u32>, now: i64) -> Result<Resolution> {
        if packet.is_expired(now, self.expiry) {
            self.store.record_deadlock(&DeadlockRecord {
                sequence: packet.sequence(),
                packet: packet.encode(),
                recorded_at: now,
            })?;
            info!(
                seq = packet.sequence(),
                age_ms = packet.age_millis(now),
                "deadlock recorded"
            );
            return Ok(Resolution {
                outcome: Outcome::Deadlocked,
                response: Some(Packet::error_response(
                    packet.sequence(),
                    packet.type_id(),
                    ErrorCode::DeadlockTimeout,
                    "Deadlock timeout",
                )),
            });
        }

        if let Some(version) = version {
            self.store
                .put_sync_record(self.local_node, version, &packet.encode())?;
        }
        debug!(seq = packet.sequence(), type_id = packet.type_id(), "packet accepted");
        Ok(Resolution::silent(Outcome::Accepted))
    }
}

/// Parse the sync body of a signed full-sync packet.
pub fn sync_body(packet: &Packet) -> crisp_core::error::Result<SyncPayload> {
    let signed = SignedPayload::parse(packet.payload())?;
    SyncPayload::decode(signed.body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crisp_core::payload::{EthicsPayload, PacketBody};
    use crisp_core::quorum::sign;
    use crisp_core::{Keypair, MerkleDigest, Priority};
    use crisp_store::MemoryStore;

    const NOW: i64 = 1_000_000;

    struct Harness {
        store: MemoryStore,
        local: NodeId,
        neighbors: Vec<NodeId>,
        reputation: ReputationTable,
        keypair: Keypair,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                local: NodeId::new("local"),
                neighbors: vec![NodeId::new("n1"), NodeId::new("n2"), NodeId::new("n3")],
                reputation: ReputationTable::new(),
                keypair: Keypair::from_seed(&[9u8; 32]),
            }
        }

        fn resolver(&self) -> ConflictResolver<'_, MemoryStore> {
            ConflictResolver::new(&self.store, &self.local, &self.neighbors, &self.reputation)
        }

        fn sync_packet(&self, seq: u64, digest: u8, created_at: i64) -> Packet {
            let body = SyncPayload {
                version: 1,
                priority: Priority::NORMAL,
                entry_count: 1,
                range_start: 100,
                range_end: 200,
                digest: MerkleDigest::from_bytes([digest; 32]),
                clock: Bytes::new(),
            };
            let packet = Packet::builder(PacketKind::FullSync)
                .sequence(seq)
                .created_at(created_at)
                .payload(body.encode().unwrap())
                .build()
                .unwrap();
            sign(&packet, &self.keypair).unwrap()
        }

        fn store_record(&self, packet: &Packet) {
            self.store
                .put_sync_record(&self.local, 1, &packet.encode())
                .unwrap();
        }
    }

    fn error_code(resolution: &Resolution) -> (u64, ErrorCode) {
        let response = resolution.response.as_ref().expect("response");
        match PacketBody::parse(response).unwrap() {
            PacketBody::ErrorResponse(err) => (err.correlation_id, err.error_code().unwrap()),
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_record_accepts_and_stores() {
        let h = Harness::new();
        let packet = h.sync_packet(10, 1, NOW);
        let res = h.resolver().resolve(&packet, NOW).unwrap();

        assert_eq!(res.outcome, Outcome::Accepted);
        assert!(res.response.is_none());
        assert_eq!(
            h.store.sync_record(&h.local, 1).unwrap().unwrap(),
            packet.encode()
        );
    }

    #[test]
    fn test_equal_digest_accepts() {
        let h = Harness::new();
        h.store_record(&h.sync_packet(5, 1, NOW));
        let res = h.resolver().resolve(&h.sync_packet(10, 1, NOW), NOW).unwrap();
        assert_eq!(res.outcome, Outcome::Accepted);
    }

    #[test]
    fn test_conflict_without_votes_is_version_conflict() {
        let h = Harness::new();
        h.store_record(&h.sync_packet(5, 1, NOW));
        let res = h.resolver().resolve(&h.sync_packet(10, 2, NOW), NOW).unwrap();

        assert_eq!(res.outcome, Outcome::Rejected(ErrorCode::VersionConflict));
        assert_eq!(error_code(&res), (10, ErrorCode::VersionConflict));
    }

    #[test]
    fn test_conflict_incoming_wins_vote() {
        let h = Harness::new();
        h.store_record(&h.sync_packet(5, 1, NOW));
        h.store.record_vote(&NodeId::new("n1"), 10).unwrap();
        h.store.record_vote(&NodeId::new("n2"), 10).unwrap();
        h.store.record_vote(&NodeId::new("n3"), 5).unwrap();

        let incoming = h.sync_packet(10, 2, NOW);
        let res = h.resolver().resolve(&incoming, NOW).unwrap();

        assert_eq!(res.outcome, Outcome::IncomingWon);
        assert!(res.response.is_none());
        assert_eq!(
            h.store.sync_record(&h.local, 1).unwrap().unwrap(),
            incoming.encode()
        );
    }

    #[test]
    fn test_vote_matches_wire_width_sequence() {
        let h = Harness::new();
        h.store_record(&h.sync_packet(5, 1, NOW));
        let incoming = h.sync_packet(0x1_0000_000A, 2, NOW);
        assert_eq!(incoming.sequence(), 10);
        h.store.record_vote(&NodeId::new("n1"), 0x1_0000_000A).unwrap();

        let decoded = Packet::decode(&incoming.encode()).unwrap();
        let res = h.resolver().resolve(&decoded, NOW).unwrap();
        assert_eq!(res.outcome, Outcome::IncomingWon);
    }

    #[test]
    fn test_conflict_stored_wins_by_reputation() {
        let mut h = Harness::new();
        let stored = h.sync_packet(5, 1, NOW);
        h.store_record(&stored);
        h.store.record_vote(&NodeId::new("n1"), 10).unwrap();
        h.store.record_vote(&NodeId::new("n2"), 10).unwrap();
        h.store.record_vote(&NodeId::new("n3"), 5).unwrap();
        h.reputation.set(NodeId::new("n3"), 5.0);

        let res = h.resolver().resolve(&h.sync_packet(10, 2, NOW), NOW).unwrap();

        assert_eq!(res.outcome, Outcome::StoredWon);
        let response = res.response.unwrap();
        assert_eq!(response.sequence(), 5);
        assert_eq!(response.payload(), stored.payload());
    }

    #[test]
    fn test_tie_goes_to_incoming() {
        let h = Harness::new();
        h.store_record(&h.sync_packet(5, 1, NOW));
        h.store.record_vote(&NodeId::new("n1"), 10).unwrap();
        h.store.record_vote(&NodeId::new("n2"), 5).unwrap();

        let res = h.resolver().resolve(&h.sync_packet(10, 2, NOW), NOW).unwrap();
        assert_eq!(res.outcome, Outcome::IncomingWon);
    }

    #[test]
    fn test_votes_from_non_neighbors_ignored() {
        let h = Harness::new();
        h.store_record(&h.sync_packet(5, 1, NOW));
        h.store.record_vote(&NodeId::new("outsider"), 10).unwrap();

        let res = h.resolver().resolve(&h.sync_packet(10, 2, NOW), NOW).unwrap();
        assert_eq!(res.outcome, Outcome::Rejected(ErrorCode::VersionConflict));
    }

    #[test]
    fn test_collect_votes_is_deterministic() {
        let h = Harness::new();
        h.store.record_vote(&NodeId::new("n1"), 10).unwrap();
        h.store.record_vote(&NodeId::new("n2"), 5).unwrap();
        h.store.record_vote(&NodeId::new("n3"), 99).unwrap();

        let a = h.sync_packet(10, 1, NOW);
        let b = h.sync_packet(5, 2, NOW);
        let first = h.resolver().collect_votes(&[&a, &b]).unwrap();
        let second = h.resolver().collect_votes(&[&a, &b]).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.weights, vec![1.0, 1.0]);
        assert_eq!(first.votes, 2);
    }

    #[test]
    fn test_deadlock_boundary() {
        let h = Harness::new();
        let created = NOW - 5000;

        let fresh = h.sync_packet(10, 1, created);
        let res = h.resolver().resolve(&fresh, NOW).unwrap();
        assert_eq!(res.outcome, Outcome::Accepted);

        let stale = h.sync_packet(11, 1, created - 1);
        let res = h.resolver().resolve(&stale, NOW).unwrap();
        assert_eq!(res.outcome, Outcome::Deadlocked);
        assert_eq!(error_code(&res), (11, ErrorCode::DeadlockTimeout));

        let record = h.store.deadlock(11).unwrap().unwrap();
        assert_eq!(record.packet, stale.encode());
        assert_eq!(record.recorded_at, NOW);
    }

    #[test]
    fn test_non_sync_kind_only_checks_deadlock() {
        let h = Harness::new();
        let body = EthicsPayload {
            entry_id: 1,
            alignment_score: 0.9,
            safety_flag: 1,
        };
        let packet = Packet::builder(PacketKind::EthicsCheck)
            .sequence(3)
            .created_at(NOW)
            .payload(body.encode())
            .build()
            .unwrap();
        let packet = sign(&packet, &h.keypair).unwrap();

        let res = h.resolver().resolve(&packet, NOW).unwrap();
        assert_eq!(res.outcome, Outcome::Accepted);
        assert!(h.store.sync_record(&h.local, 1).unwrap().is_none());
    }

    #[test]
    fn test_error_response_never_answered() {
        let h = Harness::new();
        let err = Packet::error_response(1, 0x60, ErrorCode::NotFound, "missing");
        let res = h.resolver().resolve(&err, NOW).unwrap();
        assert_eq!(res, Resolution::silent(Outcome::Ignored));
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let h = Harness::new();
        let packet = Packet::builder(PacketKind::Unknown(0x42))
            .sequence(8)
            .payload(vec![0u8; 4])
            .build()
            .unwrap();
        let res = h.resolver().resolve(&packet, NOW).unwrap();
        assert_eq!(error_code(&res), (8, ErrorCode::MalformedPacket));
    }

    #[test]
    fn test_short_sync_header_is_malformed() {
        let h = Harness::new();
        let packet = Packet::builder(PacketKind::FullSync)
            .sequence(4)
            .payload(vec![0u8; 10])
            .build()
            .unwrap();
        let packet = sign(&packet, &h.keypair).unwrap();

        let res = h.resolver().resolve(&packet, NOW).unwrap();
        assert_eq!(error_code(&res), (4, ErrorCode::MalformedPacket));
    }

    #[test]
    fn test_unreadable_stored_record_is_malformed() {
        let h = Harness::new();
        h.store.put_sync_record(&h.local, 1, b"garbage").unwrap();

        let res = h.resolver().resolve(&h.sync_packet(10, 1, NOW), NOW).unwrap();
        assert_eq!(error_code(&res), (10, ErrorCode::MalformedPacket));
    }

    #[test]
    fn test_tally_winner() {
        let tally = VoteTally {
            weights: vec![0.0, 0.0],
            votes: 1,
        };
        assert_eq!(tally.winner(), Some(0));

        let tally = VoteTally {
            weights: vec![1.0, 2.0],
            votes: 2,
        };
        assert_eq!(tally.winner(), Some(1));

        let tally = VoteTally {
            weights: vec![0.0, 0.0],
            votes: 0,
        };
        assert_eq!(tally.winner(), None);
    }
}
