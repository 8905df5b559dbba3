//! Error types for CRISP core primitives.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building, encoding, or decoding packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("checksum mismatch: header={expected}, computed={actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unknown checksum kind: 0x{0:02x}")]
    UnknownChecksumKind(u8),

    #[error("packet too large: {len} bytes exceeds {max}")]
    PacketTooLarge { len: usize, max: usize },

    #[error("field {field} too long: {len} exceeds {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl CodecError {
    /// The wire error code a peer should receive for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CodecError::ChecksumMismatch { .. } => ErrorCode::InvalidDigest,
            CodecError::MalformedPacket(_)
            | CodecError::UnknownChecksumKind(_)
            | CodecError::PacketTooLarge { .. }
            | CodecError::FieldTooLong { .. } => ErrorCode::MalformedPacket,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        CodecError::MalformedPacket(msg.into())
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error codes carried in error response packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Structural decode failure.
    MalformedPacket = 0x0001,
    /// Referenced entry or range is not known.
    NotFound = 0x0003,
    /// Competing versions could not be resolved by vote.
    VersionConflict = 0x0007,
    /// Sender gave up after exhausting its retries.
    SyncFailedAfterRetries = 0x0008,
    /// Content digest or checksum did not match.
    InvalidDigest = 0x0009,
    /// Signature quorum was not met.
    UnauthorizedUpdate = 0x000A,
    /// Packet aged past the expiry threshold during resolution.
    DeadlockTimeout = 0x000B,
}

impl ErrorCode {
    /// Convert to u16 for the wire.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::MalformedPacket),
            0x0003 => Some(Self::NotFound),
            0x0007 => Some(Self::VersionConflict),
            0x0008 => Some(Self::SyncFailedAfterRetries),
            0x0009 => Some(Self::InvalidDigest),
            0x000A => Some(Self::UnauthorizedUpdate),
            0x000B => Some(Self::DeadlockTimeout),
            _ => None,
        }
    }

    /// Short human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::MalformedPacket => "malformed packet",
            Self::NotFound => "entry not found",
            Self::VersionConflict => "version conflict",
            Self::SyncFailedAfterRetries => "sync failed after retries",
            Self::InvalidDigest => "invalid content digest",
            Self::UnauthorizedUpdate => "unauthorized update",
            Self::DeadlockTimeout => "deadlock timeout",
        }
    }
}
