//! End-to-end scenarios between in-memory nodes.

use std::time::Duration;

use crisp::core::payload::ErrorPayload;
use crisp::core::quorum;
use crisp::core::{now_millis, VectorClock};
use crisp::store::{SqliteStore, SyncStore};
use crisp::sync::resolver::sync_body;
use crisp::sync::MemorySendQueue;
use crisp::{
    ErrorCode, NodeConfig, NodeId, Packet, PacketBody, PacketKind, Priority, SkcNode,
};
use crisp_testkit::{connect, deliver, multi_party_fixtures, TestNode};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn single_signer() -> NodeConfig {
    NodeConfig {
        use_quorums: false,
        ..NodeConfig::default()
    }
}

fn cluster(count: usize, config: NodeConfig) -> Vec<TestNode> {
    let mut nodes: Vec<TestNode> = multi_party_fixtures(count)
        .iter()
        .map(|p| p.node(config.clone()))
        .collect();
    connect(&mut nodes);
    nodes
}

fn error_of(packet: &Packet) -> ErrorPayload {
    match PacketBody::parse(packet).unwrap() {
        PacketBody::ErrorResponse(e) => e,
        other => panic!("expected error response, got {:?}", other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signatures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_signature_meets_threshold_one_only() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());

    let packet = nodes[0]
        .sync_range(1000, 2000, &[br#"{"fact":"water boils at 100C"}"#.as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    let key = nodes[0].public_key();

    assert!(quorum::verify(&packet, &[key], 1));
    assert!(!quorum::verify(&packet, &[key], 3));
    assert!(!quorum::verify(&packet, &[nodes[1].public_key()], 1));
}

#[tokio::test]
async fn test_missing_quorum_is_unauthorized() {
    init_tracing();
    let mut nodes = cluster(2, NodeConfig::default());

    let packet = nodes[0].ethics_check(1000, 0.9, 1).unwrap();
    let from = nodes[0].id().clone();
    let response = nodes[1].receive(&from, &packet.encode()).await.unwrap();

    let err = error_of(&response);
    assert_eq!(err.error_code(), Some(ErrorCode::UnauthorizedUpdate));
    assert_eq!(err.correlation_id, u64::from(packet.wire_sequence()));
    assert_eq!(err.original_type, 0x6E);
}

#[tokio::test]
async fn test_unknown_origin_is_unauthorized() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let stranger = crisp_testkit::TestFixture::with_seed("stranger", [9; 32]).node(single_signer());

    let packet = stranger.add_provenance(7, "a->b").unwrap();
    let response = nodes[1]
        .receive(stranger.id(), &packet.encode())
        .await
        .unwrap();

    let err = error_of(&response);
    assert_eq!(err.error_code(), Some(ErrorCode::UnauthorizedUpdate));
    assert_eq!(err.message, "Unknown origin");
    assert_eq!(nodes[1].queue().pop().await.unwrap().peer, NodeId::new("stranger"));
}

#[tokio::test]
async fn test_cosigned_packet_meets_quorum() {
    init_tracing();
    let mut nodes = cluster(4, NodeConfig::default());
    nodes[1].set_cosigners(vec![NodeId::new("node3"), NodeId::new("node4")]);

    let packet = nodes[0].ethics_check(1000, 0.75, 1).unwrap();
    let packet = nodes[2].co_sign(&packet).unwrap();
    let packet = nodes[3].co_sign(&packet).unwrap();

    let from = nodes[0].id().clone();
    let response = nodes[1].receive(&from, &packet.encode()).await;

    assert!(response.is_none());
    assert!(nodes[1].queue().is_empty().await);
}

#[tokio::test]
async fn test_unknown_cosigner_keeps_its_position() {
    init_tracing();
    let mut nodes = cluster(4, NodeConfig::default());
    nodes[1].set_cosigners(vec![
        NodeId::new("ghost"),
        NodeId::new("node3"),
        NodeId::new("node4"),
    ]);
    let ghost = crisp::Keypair::from_seed(&[0x77; 32]);

    let packet = nodes[0].ethics_check(1000, 0.75, 1).unwrap();
    let packet = quorum::co_sign(&packet, &ghost).unwrap();
    let packet = nodes[2].co_sign(&packet).unwrap();
    let packet = nodes[3].co_sign(&packet).unwrap();

    let from = nodes[0].id().clone();
    let response = nodes[1].receive(&from, &packet.encode()).await;

    assert!(response.is_none());
    assert!(nodes[1].queue().is_empty().await);
}

// ─────────────────────────────────────────────────────────────────────────────
// Conflicts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_conflict_without_votes_is_version_conflict() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let (left, right) = nodes.split_at_mut(1);
    let (a, b) = (&mut left[0], &mut right[0]);

    b.sync_range(1000, 2000, &[b"local".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    b.queue().drain().await;

    let sent = a
        .sync_range(1000, 2000, &[b"remote".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    let responses = deliver(a, b).await;

    assert_eq!(responses.len(), 1);
    let response = responses[0].as_ref().unwrap();
    let err = error_of(response);
    assert_eq!(err.error_code(), Some(ErrorCode::VersionConflict));
    assert_eq!(err.correlation_id, u64::from(sent.wire_sequence()));
    assert_eq!(err.original_type, 0x60);
    assert_eq!(err.message, "Conflict unresolved");

    let reply = b.queue().pop().await.unwrap();
    assert_eq!(&reply.peer, a.id());
    assert_eq!(reply.priority, Priority::ELEVATED);
}

#[tokio::test]
async fn test_vote_for_incoming_replaces_stored_record() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let (left, right) = nodes.split_at_mut(1);
    let (a, b) = (&mut left[0], &mut right[0]);

    b.sync_range(1000, 2000, &[b"local".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    b.queue().drain().await;

    let sent = a
        .sync_range(1000, 2000, &[b"remote".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    b.cast_vote(a.id(), sent.sequence()).unwrap();

    assert_eq!(deliver(a, b).await, vec![None]);
    assert_eq!(
        b.store().sync_record(b.id(), 1).unwrap().unwrap(),
        sent.encode()
    );
    assert_eq!(b.clock().get(a.id()), 1);
}

#[tokio::test]
async fn test_vote_for_stored_sends_it_back() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let (left, right) = nodes.split_at_mut(1);
    let (a, b) = (&mut left[0], &mut right[0]);

    let stored = b
        .sync_range(1000, 2000, &[b"local".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    b.queue().drain().await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    a.sync_range(1000, 2000, &[b"remote".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    b.cast_vote(a.id(), stored.sequence()).unwrap();

    let responses = deliver(a, b).await;
    let response = responses[0].as_ref().unwrap();
    assert_eq!(response.kind(), PacketKind::FullSync);
    assert_eq!(response.encode(), stored.encode());
    assert_eq!(
        b.store().sync_record(b.id(), 1).unwrap().unwrap(),
        stored.encode()
    );
}

#[tokio::test]
async fn test_equal_digest_is_accepted_and_clock_merged() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let (left, right) = nodes.split_at_mut(1);
    let (a, b) = (&mut left[0], &mut right[0]);

    b.sync_range(1, 2, &[b"same".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    let sent = a
        .sync_range(1, 2, &[b"same".as_slice()], Priority::NORMAL)
        .await
        .unwrap();

    assert_eq!(deliver(a, b).await, vec![None]);
    let remote = VectorClock::decode(&sync_body(&sent).unwrap().clock).unwrap();
    assert_eq!(remote.get(a.id()), Some(&1));
    assert_eq!(b.clock().get(a.id()), 1);
    assert_eq!(b.clock().get(b.id()), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Rejections
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_checksum_mismatch_gets_invalid_digest() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());

    let packet = nodes[0].validate_semantics(1000, 12345, 1).unwrap();
    let mut bytes = packet.encode().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let from = nodes[0].id().clone();
    let response = nodes[1].receive(&from, &bytes).await.unwrap();

    let err = error_of(&response);
    assert_eq!(err.code, 0x0009);
    assert_eq!(err.correlation_id, u64::from(packet.wire_sequence()));
    assert_eq!(err.original_type, 0x6A);
    assert!(err.message.starts_with("checksum mismatch"));
}

#[tokio::test]
async fn test_unknown_kind_is_malformed() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let packet = Packet::new(PacketKind::Unknown(0x99), vec![1u8, 2, 3]).unwrap();

    let from = nodes[0].id().clone();
    let response = nodes[1].receive(&from, &packet.encode()).await.unwrap();

    let err = error_of(&response);
    assert_eq!(err.error_code(), Some(ErrorCode::MalformedPacket));
    assert_eq!(err.message, "Invalid packet format");
}

#[tokio::test]
async fn test_error_responses_are_never_answered() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let from = nodes[0].id().clone();

    let error = Packet::error_response(42, 0x60, ErrorCode::NotFound, "missing");
    assert!(nodes[1].receive(&from, &error.encode()).await.is_none());

    let mut corrupted = error.encode().to_vec();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;
    assert!(nodes[1].receive(&from, &corrupted).await.is_none());

    assert!(nodes[1].queue().is_empty().await);
}

#[tokio::test]
async fn test_buffered_packet_deadlocks() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let packet = nodes[0].share_reasoning_trace(1000, r#"{"step":"deduce"}"#).unwrap();
    let from = nodes[0].id().clone();

    let now = now_millis();
    let response = nodes[1]
        .receive_at(&from, &packet.encode(), now - 6000, now)
        .await
        .unwrap();

    let err = error_of(&response);
    assert_eq!(err.error_code(), Some(ErrorCode::DeadlockTimeout));
    assert_eq!(err.message, "Deadlock timeout");

    let deadlocks = nodes[1].deadlocks().unwrap();
    assert_eq!(deadlocks.len(), 1);
    assert_eq!(deadlocks[0].sequence, u64::from(packet.wire_sequence()));
    assert_eq!(deadlocks[0].recorded_at, now);
}

#[tokio::test]
async fn test_packet_at_expiry_is_accepted() {
    init_tracing();
    let mut nodes = cluster(2, single_signer());
    let packet = nodes[0].share_reasoning_trace(1, "t").unwrap();
    let from = nodes[0].id().clone();

    let now = now_millis();
    let response = nodes[1]
        .receive_at(&from, &packet.encode(), now - 5000, now)
        .await;

    assert!(response.is_none());
    assert!(nodes[1].deadlocks().unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Gossip and Storage
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gossip_survives_unreachable_leader() {
    init_tracing();
    let mut nodes = cluster(3, single_signer());
    nodes[0].add_cluster_leader(NodeId::new("leader1"));
    nodes[0].add_cluster_leader(NodeId::new("leader2"));
    nodes[0]
        .queue()
        .mark_unreachable(NodeId::new("leader1"))
        .await;

    let packet = nodes[0].lightweight_sync(1, 2, &[b"a".as_slice()]).unwrap();
    let delivered = nodes[0].gossip(&packet).await;

    assert_eq!(delivered, 1);
    let sent = nodes[0].queue().drain().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].peer, NodeId::new("leader2"));
}

#[tokio::test]
async fn test_sqlite_backed_node_persists_records() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.db");
    let fixture = crisp_testkit::TestFixture::with_seed("node1", [1; 32]);

    let sent = {
        let mut node = SkcNode::new(
            fixture.id.clone(),
            fixture.keypair.clone(),
            SqliteStore::open(&path).unwrap(),
            MemorySendQueue::new(),
            single_signer(),
        );
        node.sync_range(1000, 2000, &[b"persisted".as_slice()], Priority::NORMAL)
            .await
            .unwrap()
    };

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(
        store.sync_record(&fixture.id, 1).unwrap().unwrap(),
        sent.encode()
    );
}

#[tokio::test]
async fn test_config_from_json_drives_node() {
    init_tracing();
    let config: NodeConfig = serde_json::from_str(
        r#"{"use_vector_clocks": false, "hot_access_threshold": 1, "checksum_kind": "sha256_prefix"}"#,
    )
    .unwrap();
    let mut node = multi_party_fixtures(1)[0].node(config);

    node.sync_range(5, 6, &[b"x".as_slice()], Priority::NORMAL)
        .await
        .unwrap();
    let hot = node
        .sync_range(5, 6, &[b"x".as_slice()], Priority::NORMAL)
        .await
        .unwrap();

    assert!(node.is_cached(5, 6));
    assert_eq!(hot.checksum_kind(), crisp::ChecksumKind::Sha256Prefix);
    let body = sync_body(&hot).unwrap();
    assert_eq!(body.priority, Priority::HOT);
    assert!(body.clock.is_empty());
}
