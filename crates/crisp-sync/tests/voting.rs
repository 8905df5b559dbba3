//! Property tests for conflict voting.

use bytes::Bytes;
use proptest::prelude::*;

use crisp_core::payload::SyncPayload;
use crisp_core::quorum::sign;
use crisp_core::{Keypair, MerkleDigest, NodeId, Packet, PacketKind, Priority};
use crisp_store::{MemoryStore, SyncStore};
use crisp_sync::{ConflictResolver, Outcome, ReputationTable};

const NOW: i64 = 50_000;
const INCOMING: u64 = 20;
const STORED: u64 = 10;

fn sync_packet(seq: u64, digest: u8) -> Packet {
    let body = SyncPayload {
        version: 1,
        priority: Priority::NORMAL,
        entry_count: 1,
        range_start: 0,
        range_end: 10,
        digest: MerkleDigest::from_bytes([digest; 32]),
        clock: Bytes::new(),
    };
    let packet = Packet::builder(PacketKind::FullSync)
        .sequence(seq)
        .created_at(NOW)
        .payload(body.encode().unwrap())
        .build()
        .unwrap();
    sign(&packet, &Keypair::from_seed(&[3; 32])).unwrap()
}

/// `None` abstains, `Some(true)` votes incoming, `Some(false)` votes stored.
fn ballot() -> impl Strategy<Value = (Option<bool>, f64)> {
    (prop::option::of(any::<bool>()), 0.0f64..5.0)
}

fn resolve(ballots: &[(Option<bool>, f64)]) -> Outcome {
    let store = MemoryStore::new();
    let local = NodeId::new("local");
    let mut reputation = ReputationTable::new();
    let mut neighbors = Vec::new();

    store
        .put_sync_record(&local, 1, &sync_packet(STORED, 1).encode())
        .unwrap();
    for (i, (vote, weight)) in ballots.iter().enumerate() {
        let node = NodeId::new(format!("n{}", i));
        reputation.set(node.clone(), *weight);
        if let Some(for_incoming) = vote {
            let seq = if *for_incoming { INCOMING } else { STORED };
            store.record_vote(&node, seq).unwrap();
        }
        neighbors.push(node);
    }

    ConflictResolver::new(&store, &local, &neighbors, &reputation)
        .resolve(&sync_packet(INCOMING, 2), NOW)
        .unwrap()
        .outcome
}

proptest! {
    #[test]
    fn prop_conflict_outcome_is_deterministic(
        ballots in prop::collection::vec(ballot(), 0..6),
    ) {
        prop_assert_eq!(resolve(&ballots), resolve(&ballots));
    }

    #[test]
    fn prop_heavier_side_wins(ballots in prop::collection::vec(ballot(), 0..6)) {
        let weight_for = |side: bool| -> f64 {
            ballots
                .iter()
                .filter(|(vote, _)| *vote == Some(side))
                .map(|(_, w)| *w)
                .sum()
        };
        let voters = ballots.iter().filter(|(vote, _)| vote.is_some()).count();

        let expected = if voters == 0 {
            Outcome::Rejected(crisp_core::ErrorCode::VersionConflict)
        } else if weight_for(true) >= weight_for(false) {
            Outcome::IncomingWon
        } else {
            Outcome::StoredWon
        };
        prop_assert_eq!(resolve(&ballots), expected);
    }
}
