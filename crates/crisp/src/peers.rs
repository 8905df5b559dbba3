//! Public keys of known peers.
//!
//! Keys are provisioned out of band. Inbound signatures are checked
//! positionally: the origin signs first, then co-signers in the order
//! configured here. A co-signer without a known key still holds its slot.

use std::collections::HashMap;

use crisp_core::{Ed25519PublicKey, NodeId};

/// Known peer keys plus the ordered co-signer set.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    keys: HashMap<NodeId, Ed25519PublicKey>,
    cosigners: Vec<NodeId>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a peer's key.
    pub fn insert(&mut self, node: NodeId, key: Ed25519PublicKey) {
        self.keys.insert(node, key);
    }

    pub fn key(&self, node: &NodeId) -> Option<&Ed25519PublicKey> {
        self.keys.get(node)
    }

    /// Set the nodes expected to co-sign, in signing order.
    pub fn set_cosigners(&mut self, cosigners: Vec<NodeId>) {
        self.cosigners = cosigners;
    }

    pub fn cosigners(&self) -> &[NodeId] {
        &self.cosigners
    }

    /// Keys to check a packet from `origin` against, in signature order.
    ///
    /// `None` if the origin's key is unknown. A co-signer without a known key
    /// yields a `None` slot, which no signature can satisfy.
    pub fn candidates_for(&self, origin: &NodeId) -> Option<Vec<Option<Ed25519PublicKey>>> {
        let first = *self.keys.get(origin)?;
        let mut slots = vec![Some(first)];
        slots.extend(
            self.cosigners
                .iter()
                .filter(|node| *node != origin)
                .map(|node| self.keys.get(node).copied()),
        );
        Some(slots)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
