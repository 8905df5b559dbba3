//! Golden wire vectors.
//!
//! Each vector pins the exact bytes a packet encodes to, so a change to the
//! header layout, checksum algorithms, or signature trailer shows up as a
//! test failure instead of a silent incompatibility between peers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crisp_core::payload::EthicsPayload;
use crisp_core::quorum;
use crisp_core::{ChecksumKind, Keypair, Packet, PacketKind};

/// A golden test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenVector {
    pub name: String,
    pub type_id: u8,
    pub checksum_kind: ChecksumKind,
    pub sequence: u64,
    /// Unsigned body (hex).
    pub body_hex: String,
    /// Seed (hex) of the single signer, if the packet is signed.
    pub signer_seed: Option<String>,
    /// Expected encoded packet (hex).
    pub wire_hex: String,
}

fn vector(
    name: &str,
    type_id: u8,
    checksum_kind: ChecksumKind,
    sequence: u64,
    body: &[u8],
    signer_seed: Option<[u8; 32]>,
    wire_hex: &str,
) -> GoldenVector {
    GoldenVector {
        name: name.to_string(),
        type_id,
        checksum_kind,
        sequence,
        body_hex: hex::encode(body),
        signer_seed: signer_seed.map(hex::encode),
        wire_hex: wire_hex.to_string(),
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    let ethics = EthicsPayload {
        entry_id: 1000,
        alignment_score: 0.5,
        safety_flag: 1,
    }
    .encode();

    vec![
        vector(
            "crc32c check string",
            0x60,
            ChecksumKind::Crc32c,
            1,
            b"123456789",
            None,
            "6001001500000001e3069283313233343536373839",
        ),
        vector(
            "sha256 prefix check string",
            0x60,
            ChecksumKind::Sha256Prefix,
            1,
            b"123456789",
            None,
            "600200150000000115e2b0d3313233343536373839",
        ),
        vector(
            "empty payload crc32c",
            0x50,
            ChecksumKind::Crc32c,
            0,
            b"",
            None,
            "5001000c0000000000000000",
        ),
        vector(
            "empty payload sha256 prefix",
            0x50,
            ChecksumKind::Sha256Prefix,
            0,
            b"",
            None,
            "5002000c00000000e3b0c442",
        ),
        vector(
            "high sequence adapter",
            0x6F,
            ChecksumKind::Sha256Prefix,
            0xDEAD_BEEF,
            b"abc",
            None,
            "6f02000fdeadbeefba7816bf616263",
        ),
        vector(
            "single signed ethics check",
            0x6E,
            ChecksumKind::Crc32c,
            7,
            &ethics,
            Some([0x42; 32]),
            concat!(
                "6e01005b0000000749749eb3",
                "00000000000003e83f00000001",
                "cf46ca318661b8a186146b6794dccbab7d272499fefce5109c5660e46e6eb430",
                "6be95cf86b02fda907bad6b800760ef82400b019fdd7ce394b5d14991502750c",
                "0001",
            ),
        ),
    ]
}

/// Rebuild the packet a vector describes.
pub fn build_packet(vector: &GoldenVector) -> Packet {
    let body = hex::decode(&vector.body_hex).expect("vector body is hex");
    let packet = Packet::builder(PacketKind::from_u8(vector.type_id))
        .sequence(vector.sequence)
        .checksum_kind(vector.checksum_kind)
        .payload(Bytes::from(body))
        .build()
        .expect("vector body fits in a packet");

    match &vector.signer_seed {
        Some(seed_hex) => {
            let mut seed = [0u8; 32];
            hex::decode_to_slice(seed_hex, &mut seed).expect("vector seed is 32 hex bytes");
            quorum::sign(&packet, &Keypair::from_seed(&seed)).expect("signing fits")
        }
        None => packet,
    }
}

/// Check every vector, reporting `(name, matches, actual_hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let actual = hex::encode(build_packet(v).encode());
            (v.name.clone(), actual == v.wire_hex, actual)
        })
        .collect()
}

/// All vectors as pretty JSON, for sharing with other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}
