//! Integrity tree: a binary Merkle digest over synchronized entries.
//!
//! Leaves are `SHA-256(entry)`, internal nodes are `SHA-256(left || right)`.
//! When a level has an odd number of nodes the last one is promoted to the
//! next level unchanged (it is not hashed with itself). Peers must use the
//! same reduction to compare roots, so this rule is part of the protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::sha256;

/// A 32-byte Merkle root.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleDigest(pub [u8; 32]);

impl MerkleDigest {
    /// Digest of an empty tree.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for MerkleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleDigest({})", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for MerkleDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Append-only sequence of leaf hashes.
#[derive(Debug, Clone, Default)]
pub struct IntegrityTree {
    leaves: Vec<[u8; 32]>,
}

impl IntegrityTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the hash of `entry`.
    pub fn add_leaf(&mut self, entry: &[u8]) {
        self.leaves.push(sha256(entry));
    }

    /// Recompute the root from the current leaves.
    pub fn root(&self) -> MerkleDigest {
        merkle_root(&self.leaves)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether no leaves have been added.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The leaf hashes in insertion order.
    pub fn leaves(&self) -> &[[u8; 32]] {
        &self.leaves
    }
}

/// Compute the root over already-hashed leaves.
pub fn merkle_root(leaves: &[[u8; 32]]) -> MerkleDigest {
    if leaves.is_empty() {
        return MerkleDigest::ZERO;
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(left);
                    buf[32..].copy_from_slice(right);
                    sha256(&buf)
                }
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }

    MerkleDigest(level[0])
}
