//! Node configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crisp_core::quorum::QuorumPolicy;
use crisp_core::ChecksumKind;

/// Configuration for an [`SkcNode`](crate::SkcNode).
///
/// Every field has a default, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Attach vector clocks to sync packets.
    pub use_vector_clocks: bool,
    /// Require a signature quorum instead of a single signer.
    pub use_quorums: bool,
    /// Gossip to cluster leaders instead of all neighbors.
    pub use_hierarchical_gossip: bool,
    /// Verify signatures on inbound signed packets.
    pub verify_signatures: bool,
    /// Explicit quorum threshold; overrides `use_quorums`.
    pub quorum_threshold: Option<usize>,
    /// Bound on vector clock entries.
    pub max_clock_entries: usize,
    /// Accesses after which a range counts as hot.
    pub hot_access_threshold: u32,
    /// Capacity of the hot-range cache.
    pub cache_capacity: usize,
    /// Age after which an unresolved packet is deadlocked.
    pub deadlock_expiry_ms: u64,
    /// Checksum for outbound packets.
    pub checksum_kind: ChecksumKind,
    /// Protocol version stamped on sync payloads.
    pub protocol_version: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            use_vector_clocks: true,
            use_quorums: true,
            use_hierarchical_gossip: true,
            verify_signatures: true,
            quorum_threshold: None,
            max_clock_entries: crisp_core::clock::DEFAULT_MAX_ENTRIES,
            hot_access_threshold: 10,
            cache_capacity: crisp_store::cache::DEFAULT_CAPACITY,
            deadlock_expiry_ms: 5000,
            checksum_kind: ChecksumKind::Crc32c,
            protocol_version: 1,
        }
    }
}

impl NodeConfig {
    /// The signature policy for inbound packets.
    pub fn quorum_policy(&self) -> QuorumPolicy {
        match self.quorum_threshold {
            Some(threshold) => QuorumPolicy::with_threshold(threshold),
            None => QuorumPolicy::new(self.use_quorums),
        }
    }

    pub fn deadlock_expiry(&self) -> Duration {
        Duration::from_millis(self.deadlock_expiry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_policy() {
        let mut config = NodeConfig::default();
        assert_eq!(config.quorum_policy().threshold(), 3);

        config.use_quorums = false;
        assert_eq!(config.quorum_policy().threshold(), 1);

        config.quorum_threshold = Some(2);
        assert_eq!(config.quorum_policy().threshold(), 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"use_quorums": false, "checksum_kind": "sha256_prefix"}"#)
                .unwrap();
        assert!(!config.use_quorums);
        assert_eq!(config.checksum_kind, ChecksumKind::Sha256Prefix);
        assert_eq!(config.deadlock_expiry(), Duration::from_millis(5000));
        assert_eq!(config.max_clock_entries, 10);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = NodeConfig {
            quorum_threshold: Some(4),
            ..NodeConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<NodeConfig>(&json).unwrap(), config);
    }
}
