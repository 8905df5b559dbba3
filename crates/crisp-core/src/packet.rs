//! Packet: the unit of exchange between SKC peers.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! +---------+---------------+--------------+-------------+-------------+---------+
//! | type_id | checksum_kind | total_length | sequence    | checksum    | payload |
//! | u8      | u8            | u16          | u32         | [u8; 4]     | ...     |
//! +---------+---------------+--------------+-------------+-------------+---------+
//! ```
//!
//! `total_length` counts the header. The logical sequence is 64 bits wide but
//! only its low 32 bits travel on the wire; a decoded packet carries the
//! widened 32-bit value, and peers correlate on that value.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

use crate::checksum::{ChecksumKind, CHECKSUM_LEN};
use crate::error::{CodecError, ErrorCode, Result};
use crate::types::now_millis;

/// Size of the fixed packet header.
pub const HEADER_SIZE: usize = 12;

/// Largest encodable packet, header included.
pub const MAX_PACKET_LEN: usize = u16::MAX as usize;

/// Largest payload that fits in a packet.
pub const MAX_PAYLOAD_LEN: usize = MAX_PACKET_LEN - HEADER_SIZE;

/// Fixed prefix of an error response payload (before the message bytes).
const ERROR_PREFIX_LEN: usize = 8 + 1 + 2 + 2;

/// The kind of packet, determining how the payload is interpreted.
///
/// Kinds compare by wire type id, so `Unknown(0x60)` equals `FullSync`.
#[derive(Debug, Clone, Copy)]
pub enum PacketKind {
    /// Causal provenance of an entry.
    Provenance,
    /// Full range synchronization with digest and vector clock.
    FullSync,
    /// Entry synthesized from several source entries.
    KnowledgeSynthesis,
    /// Schema validation result for an entry.
    SemanticValidation,
    /// Partition to node assignments.
    PartitionDirectory,
    /// Reasoning trace attached to an entry.
    ReasoningTrace,
    /// Small urgent update for a range.
    PriorityBroadcast,
    /// Alignment score and safety flag for an entry.
    EthicsCheck,
    /// Opaque payload for a foreign protocol.
    ProtocolAdapter,
    /// Low-bandwidth range fingerprint.
    LightweightSync,
    /// Error report returned to a sender.
    ErrorResponse,
    /// A type id this node does not understand.
    Unknown(u8),
}

impl PacketKind {
    /// Convert to the wire type id.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Provenance => 0x50,
            Self::FullSync => 0x60,
            Self::KnowledgeSynthesis => 0x69,
            Self::SemanticValidation => 0x6A,
            Self::PartitionDirectory => 0x6B,
            Self::ReasoningTrace => 0x6C,
            Self::PriorityBroadcast => 0x6D,
            Self::EthicsCheck => 0x6E,
            Self::ProtocolAdapter => 0x6F,
            Self::LightweightSync => 0x70,
            Self::ErrorResponse => 0xE0,
            Self::Unknown(id) => id,
        }
    }

    /// Parse a wire type id. Never fails: unrecognized ids map to `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x50 => Self::Provenance,
            0x60 => Self::FullSync,
            0x69 => Self::KnowledgeSynthesis,
            0x6A => Self::SemanticValidation,
            0x6B => Self::PartitionDirectory,
            0x6C => Self::ReasoningTrace,
            0x6D => Self::PriorityBroadcast,
            0x6E => Self::EthicsCheck,
            0x6F => Self::ProtocolAdapter,
            0x70 => Self::LightweightSync,
            0xE0 => Self::ErrorResponse,
            other => Self::Unknown(other),
        }
    }

    /// Whether a receiver is expected to acknowledge this kind.
    pub fn needs_ack(self) -> bool {
        matches!(self.to_u8(), 0x60 | 0x61 | 0x63 | 0x67 | 0x68 | 0x69..=0x70)
    }

    /// The named variant for this type id, if there is one.
    pub fn canonical(self) -> Self {
        Self::from_u8(self.to_u8())
    }

    /// Whether payloads of this kind carry a signature trailer.
    pub fn is_signed(self) -> bool {
        !matches!(self.canonical(), Self::ErrorResponse | Self::Unknown(_))
    }
}

impl PartialEq for PacketKind {
    fn eq(&self, other: &Self) -> bool {
        self.to_u8() == other.to_u8()
    }
}

impl Eq for PacketKind {}

impl std::hash::Hash for PacketKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_u8().hash(state);
    }
}

/// An SKC packet.
///
/// The payload is immutable once built; operations that change it (such as
/// signing) return a new packet with a recomputed checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: PacketKind,
    sequence: u64,
    payload: Bytes,
    checksum: [u8; CHECKSUM_LEN],
    checksum_kind: ChecksumKind,
    created_at: i64,
    retry_count: u32,
}

impl Packet {
    /// Build a packet with the default sequence (current ms-epoch) and CRC-32C.
    pub fn new(kind: PacketKind, payload: impl Into<Bytes>) -> Result<Self> {
        PacketBuilder::new(kind).payload(payload).build()
    }

    /// Start building a packet.
    pub fn builder(kind: PacketKind) -> PacketBuilder {
        PacketBuilder::new(kind)
    }

    /// The packet kind.
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// The type id on the wire.
    pub fn type_id(&self) -> u8 {
        self.kind.to_u8()
    }

    /// The sequence / correlation id.
    ///
    /// Always fits the 32-bit header field, so a packet compares equal to
    /// its own decoded copy.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The sequence as carried in the header.
    pub fn wire_sequence(&self) -> u32 {
        self.sequence as u32
    }

    /// The payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The checksum over the payload.
    pub fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        self.checksum
    }

    /// The algorithm used for the checksum.
    pub fn checksum_kind(&self) -> ChecksumKind {
        self.checksum_kind
    }

    /// Creation (or receive) time, Unix milliseconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// How many times the sender has retried this packet.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether a receiver is expected to acknowledge this packet.
    pub fn needs_ack(&self) -> bool {
        self.kind.needs_ack()
    }

    /// Copy of this packet with one more retry recorded.
    pub fn with_retry(mut self) -> Self {
        self.retry_count = self.retry_count.saturating_add(1);
        self
    }

    /// A packet of the same kind, sequence and checksum kind with a new
    /// payload and a recomputed checksum.
    pub fn with_payload(&self, payload: impl Into<Bytes>) -> Result<Self> {
        PacketBuilder::new(self.kind)
            .sequence(self.sequence)
            .checksum_kind(self.checksum_kind)
            .created_at(self.created_at)
            .payload(payload)
            .build()
    }

    /// Age of the packet at `now` (Unix milliseconds).
    pub fn age_millis(&self, now: i64) -> i64 {
        now.saturating_sub(self.created_at)
    }

    /// Whether the packet is strictly older than `expiry` at `now`.
    pub fn is_expired(&self, now: i64, expiry: Duration) -> bool {
        self.age_millis(now) > expiry.as_millis() as i64
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Bytes {
        let total = HEADER_SIZE + self.payload.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(self.kind.to_u8());
        buf.put_u8(self.checksum_kind.to_u8());
        // Bounded by construction: payload <= MAX_PAYLOAD_LEN.
        buf.put_u16(total as u16);
        buf.put_u32(self.wire_sequence());
        buf.put_slice(&self.checksum);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode from wire bytes, stamping the packet with the current time.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_at(data, now_millis())
    }

    /// Decode from wire bytes, stamping the packet with `received_at`.
    pub fn decode_at(data: &[u8], received_at: i64) -> Result<Self> {
        let header = PacketHeader::parse(data)?;

        let total = header.total_length as usize;
        if total < HEADER_SIZE {
            return Err(CodecError::malformed(format!(
                "declared length {} shorter than header",
                total
            )));
        }
        if data.len() < total {
            return Err(CodecError::malformed(format!(
                "declared length {} but only {} bytes available",
                total,
                data.len()
            )));
        }

        let payload = Bytes::copy_from_slice(&data[HEADER_SIZE..total]);
        let computed = header.checksum_kind.compute(&payload);
        if computed != header.checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: hex::encode(header.checksum),
                actual: hex::encode(computed),
            });
        }

        Ok(Self {
            kind: header.kind,
            sequence: u64::from(header.sequence),
            payload,
            checksum: header.checksum,
            checksum_kind: header.checksum_kind,
            created_at: received_at,
            retry_count: 0,
        })
    }

    /// Build an error response for a packet that could not be handled.
    ///
    /// Messages that would overflow the packet are cut at a UTF-8 boundary.
    pub fn error_response(
        correlation_id: u64,
        original_type: u8,
        code: ErrorCode,
        message: &str,
    ) -> Self {
        let max_msg = MAX_PAYLOAD_LEN - ERROR_PREFIX_LEN;
        let mut end = message.len().min(max_msg);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        let msg = &message.as_bytes()[..end];

        let mut buf = BytesMut::with_capacity(ERROR_PREFIX_LEN + msg.len());
        buf.put_u64(correlation_id);
        buf.put_u8(original_type);
        buf.put_u16(code.to_u16());
        buf.put_u16(msg.len() as u16);
        buf.put_slice(msg);

        let payload = buf.freeze();
        let checksum_kind = ChecksumKind::default();
        Self {
            kind: PacketKind::ErrorResponse,
            sequence: u64::from(now_millis() as u32),
            checksum: checksum_kind.compute(&payload),
            payload,
            checksum_kind,
            created_at: now_millis(),
            retry_count: 0,
        }
    }
}

/// The decoded fixed header of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    pub checksum_kind: ChecksumKind,
    pub total_length: u16,
    pub sequence: u32,
    pub checksum: [u8; CHECKSUM_LEN],
}

impl PacketHeader {
    /// Parse the header without touching the payload.
    ///
    /// Useful for answering a packet whose payload failed its checksum.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::malformed(format!(
                "packet too short: {} bytes, header is {}",
                data.len(),
                HEADER_SIZE
            )));
        }
        let kind = PacketKind::from_u8(data[0]);
        let checksum_kind =
            ChecksumKind::from_u8(data[1]).ok_or(CodecError::UnknownChecksumKind(data[1]))?;
        let total_length = u16::from_be_bytes([data[2], data[3]]);
        let sequence = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let checksum = [data[8], data[9], data[10], data[11]];
        Ok(Self {
            kind,
            checksum_kind,
            total_length,
            sequence,
            checksum,
        })
    }
}

/// Builder for packets.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    kind: PacketKind,
    sequence: Option<u64>,
    payload: Bytes,
    checksum_kind: ChecksumKind,
    created_at: Option<i64>,
}

impl PacketBuilder {
    /// Start a builder for the given kind.
    pub fn new(kind: PacketKind) -> Self {
        Self {
            kind: kind.canonical(),
            sequence: None,
            payload: Bytes::new(),
            checksum_kind: ChecksumKind::default(),
            created_at: None,
        }
    }

    /// Set an explicit sequence (defaults to the current ms-epoch).
    ///
    /// Only the low 32 bits are kept, matching what the header carries.
    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the checksum algorithm.
    pub fn checksum_kind(mut self, kind: ChecksumKind) -> Self {
        self.checksum_kind = kind;
        self
    }

    /// Set the creation time (defaults to now).
    pub fn created_at(mut self, at: i64) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Finish the packet, computing its checksum.
    pub fn build(self) -> Result<Packet> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(CodecError::PacketTooLarge {
                len: HEADER_SIZE + self.payload.len(),
                max: MAX_PACKET_LEN,
            });
        }
        let now = now_millis();
        Ok(Packet {
            kind: self.kind,
            sequence: u64::from(self.sequence.unwrap_or(now as u64) as u32),
            checksum: self.checksum_kind.compute(&self.payload),
            payload: self.payload,
            checksum_kind: self.checksum_kind,
            created_at: self.created_at.unwrap_or(now),
            retry_count: 0,
        })
    }
}
