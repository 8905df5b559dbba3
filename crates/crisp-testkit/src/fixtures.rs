//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use crisp::{NodeConfig, SkcNode};
use crisp_core::{Ed25519PublicKey, Keypair, NodeId, Packet};
use crisp_store::MemoryStore;
use crisp_sync::MemorySendQueue;

/// A node backed entirely by memory.
pub type TestNode = SkcNode<MemoryStore, MemorySendQueue>;

/// A named identity with a keypair.
#[derive(Debug, Clone)]
pub struct TestFixture {
    pub id: NodeId,
    pub keypair: Keypair,
}

impl TestFixture {
    /// Create a fixture with a random keypair.
    pub fn new(name: &str) -> Self {
        Self {
            id: NodeId::new(name),
            keypair: Keypair::generate(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(name: &str, seed: [u8; 32]) -> Self {
        Self {
            id: NodeId::new(name),
            keypair: Keypair::from_seed(&seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Build an in-memory node for this identity.
    pub fn node(&self, config: NodeConfig) -> TestNode {
        SkcNode::new(
            self.id.clone(),
            self.keypair.clone(),
            MemoryStore::new(),
            MemorySendQueue::new(),
            config,
        )
    }
}

/// Create fixtures named `node1`, `node2`, ... with distinct seeds.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(&format!("node{}", i + 1), seed)
        })
        .collect()
}

/// Make every node a neighbor of every other and share all keys.
pub fn connect(nodes: &mut [TestNode]) {
    let identities: Vec<(NodeId, Ed25519PublicKey)> = nodes
        .iter()
        .map(|n| (n.id().clone(), n.public_key()))
        .collect();

    for node in nodes.iter_mut() {
        for (id, key) in &identities {
            if id != node.id() {
                node.add_peer(id.clone(), *key);
                node.add_neighbor(id.clone());
            }
        }
    }
}

/// Drain `from`'s queue and hand `to` every packet addressed to it.
///
/// Packets queued for other peers are dropped. Returns `to`'s responses in
/// delivery order.
pub async fn deliver(from: &TestNode, to: &mut TestNode) -> Vec<Option<Packet>> {
    let mut responses = Vec::new();
    for outbound in from.queue().drain().await {
        if &outbound.peer == to.id() {
            responses.push(to.receive(from.id(), &outbound.packet).await);
        }
    }
    responses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisp_core::Priority;

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);

        let pks: Vec<_> = parties.iter().map(|p| p.public_key()).collect();
        assert_ne!(pks[0], pks[1]);
        assert_ne!(pks[1], pks[2]);
        assert_ne!(pks[0], pks[2]);
        assert_eq!(parties[2].id, NodeId::new("node3"));
    }

    #[test]
    fn test_seeded_fixture_is_deterministic() {
        let a = TestFixture::with_seed("a", [7; 32]);
        let b = TestFixture::with_seed("b", [7; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_connect() {
        let parties = multi_party_fixtures(3);
        let mut nodes: Vec<_> = parties
            .iter()
            .map(|p| p.node(NodeConfig::default()))
            .collect();
        connect(&mut nodes);

        for node in &nodes {
            assert_eq!(node.neighbors().len(), 2);
            assert!(!node.neighbors().contains(node.id()));
        }
    }

    #[tokio::test]
    async fn test_deliver_accepts_fresh_sync() {
        let config = NodeConfig {
            use_quorums: false,
            ..NodeConfig::default()
        };
        let parties = multi_party_fixtures(2);
        let mut nodes: Vec<_> = parties.iter().map(|p| p.node(config.clone())).collect();
        connect(&mut nodes);
        let (left, right) = nodes.split_at_mut(1);

        left[0]
            .sync_range(1, 2, &[b"entry".as_slice()], Priority::NORMAL)
            .await
            .unwrap();
        let responses = deliver(&left[0], &mut right[0]).await;

        assert_eq!(responses, vec![None]);
        assert!(right[0].queue().is_empty().await);
    }
}
