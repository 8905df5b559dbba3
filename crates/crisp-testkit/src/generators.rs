//! Proptest generators for property-based testing.

use proptest::prelude::*;

use crisp_core::{ChecksumKind, Ed25519PublicKey, Keypair, NodeId, Packet, PacketKind, Priority};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a short printable node id.
pub fn node_id() -> impl Strategy<Value = NodeId> {
    "[a-z][a-z0-9]{0,11}".prop_map(NodeId::new)
}

pub fn checksum_kind() -> impl Strategy<Value = ChecksumKind> {
    prop_oneof![Just(ChecksumKind::Crc32c), Just(ChecksumKind::Sha256Prefix)]
}

pub fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::NORMAL),
        Just(Priority::ELEVATED),
        Just(Priority::HOT),
        Just(Priority::URGENT),
    ]
}

/// Generate one of the kinds a node knows how to interpret.
pub fn packet_kind() -> impl Strategy<Value = PacketKind> {
    prop_oneof![
        Just(PacketKind::Provenance),
        Just(PacketKind::FullSync),
        Just(PacketKind::KnowledgeSynthesis),
        Just(PacketKind::SemanticValidation),
        Just(PacketKind::PartitionDirectory),
        Just(PacketKind::ReasoningTrace),
        Just(PacketKind::PriorityBroadcast),
        Just(PacketKind::EthicsCheck),
        Just(PacketKind::ProtocolAdapter),
        Just(PacketKind::LightweightSync),
        Just(PacketKind::ErrorResponse),
    ]
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a batch of entries for a range sync.
pub fn entries(max_entries: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload(64), 0..=max_entries)
}

/// Generate a packet with an arbitrary (possibly unknown) type id.
pub fn packet() -> impl Strategy<Value = Packet> {
    (any::<u8>(), any::<u64>(), checksum_kind(), payload(512)).prop_map(
        |(type_id, seq, kind, payload)| {
            Packet::builder(PacketKind::from_u8(type_id))
                .sequence(seq)
                .checksum_kind(kind)
                .payload(payload)
                .build()
                .expect("payload fits in a packet")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_packet_kind_roundtrips(kind in packet_kind()) {
            prop_assert_eq!(PacketKind::from_u8(kind.to_u8()), kind);
        }

        #[test]
        fn test_generated_packets_decode(p in packet()) {
            let decoded = Packet::decode(&p.encode()).unwrap();
            prop_assert_eq!(decoded.type_id(), p.type_id());
            prop_assert_eq!(decoded.payload(), p.payload());
        }

        #[test]
        fn test_node_ids_are_nonempty(id in node_id()) {
            prop_assert!(!id.as_str().is_empty());
        }
    }
}
