//! Packet checksums.
//!
//! A packet carries a 4-byte checksum over its payload, computed with one of
//! two algorithms. The algorithm is tagged in the header so that a decoder
//! never has to guess which one the sender used.

use serde::{Deserialize, Serialize};

use crate::crypto::sha256;

/// Length of the checksum field.
pub const CHECKSUM_LEN: usize = 4;

/// Checksum algorithm used for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChecksumKind {
    /// CRC-32C (Castagnoli), big-endian.
    #[default]
    Crc32c = 0x01,
    /// First four bytes of SHA-256.
    Sha256Prefix = 0x02,
}

impl ChecksumKind {
    /// Wire tag.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Crc32c),
            0x02 => Some(Self::Sha256Prefix),
            _ => None,
        }
    }

    /// Compute the checksum of `data`.
    pub fn compute(self, data: &[u8]) -> [u8; CHECKSUM_LEN] {
        match self {
            ChecksumKind::Crc32c => crc32c::crc32c(data).to_be_bytes(),
            ChecksumKind::Sha256Prefix => {
                let digest = sha256(data);
                [digest[0], digest[1], digest[2], digest[3]]
            }
        }
    }
}
