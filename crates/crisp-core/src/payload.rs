//! Typed payload bodies for each packet kind.
//!
//! All integers are big-endian. Signed kinds carry their body inside a
//! [`SignedPayload`]; error responses are unsigned. Decoders are strict:
//! short reads and trailing bytes are both `MalformedPacket`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::crypto::sha256;
use crate::error::{CodecError, ErrorCode, Result};
use crate::merkle::MerkleDigest;
use crate::packet::{Packet, PacketKind};
use crate::quorum::SignedPayload;
use crate::types::{NodeId, Priority, NODE_ID_WIRE_LEN};
use crate::wire::{check_len, WireReader};

/// Bytes of a sync payload before the vector clock.
pub const SYNC_HEADER_LEN: usize = 4 + 1 + 2 + 8 + 8 + 32 + 2;

/// Width of the micro entry and lightweight fingerprint.
pub const SHORT_FIELD_LEN: usize = 8;

const U16_MAX: usize = u16::MAX as usize;

// ────────────────────────────────────────────────────────────────────────────
// Full sync (0x60)
// ────────────────────────────────────────────────────────────────────────────

/// Range synchronization with digest and vector clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPayload {
    pub version: u32,
    pub priority: Priority,
    pub entry_count: u16,
    pub range_start: u64,
    pub range_end: u64,
    pub digest: MerkleDigest,
    /// Encoded vector clock; empty when clocks are disabled.
    pub clock: Bytes,
}

impl SyncPayload {
    pub fn encode(&self) -> Result<Bytes> {
        check_len("vector clock", self.clock.len(), U16_MAX)?;
        let mut buf = BytesMut::with_capacity(SYNC_HEADER_LEN + self.clock.len());
        buf.put_u32(self.version);
        buf.put_u8(self.priority.to_u8());
        buf.put_u16(self.entry_count);
        buf.put_u64(self.range_start);
        buf.put_u64(self.range_end);
        buf.put_slice(self.digest.as_bytes());
        buf.put_u16(self.clock.len() as u16);
        buf.put_slice(&self.clock);
        Ok(buf.freeze())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < SYNC_HEADER_LEN {
            return Err(CodecError::malformed(format!(
                "sync header needs {} bytes, have {}",
                SYNC_HEADER_LEN,
                body.len()
            )));
        }
        let mut r = WireReader::new(body);
        let version = r.u32("version")?;
        let priority = Priority(r.u8("priority")?);
        let entry_count = r.u16("entry count")?;
        let range_start = r.u64("range start")?;
        let range_end = r.u64("range end")?;
        let digest = MerkleDigest::from_bytes(r.array("digest")?);
        let clock_len = r.u16("clock length")? as usize;
        let clock = Bytes::copy_from_slice(r.take(clock_len, "vector clock")?);
        r.finish("sync payload")?;
        Ok(Self {
            version,
            priority,
            entry_count,
            range_start,
            range_end,
            digest,
            clock,
        })
    }

    /// Key used for hotness tracking and the eviction cache.
    pub fn range_key(&self) -> String {
        range_key(self.range_start, self.range_end)
    }
}

/// `"start:end"` key for a range.
pub fn range_key(start: u64, end: u64) -> String {
    format!("{}:{}", start, end)
}

// ────────────────────────────────────────────────────────────────────────────
// Narrow kinds
// ────────────────────────────────────────────────────────────────────────────

/// Entry synthesized from several source entries (0x69).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisPayload {
    pub version: u32,
    pub source_ids: Vec<u64>,
    pub entry: Bytes,
}

impl SynthesisPayload {
    pub fn encode(&self) -> Result<Bytes> {
        check_len("source ids", self.source_ids.len(), U16_MAX)?;
        let mut buf = BytesMut::with_capacity(14 + 8 * self.source_ids.len() + self.entry.len());
        buf.put_u32(self.version);
        buf.put_u16(self.source_ids.len() as u16);
        buf.put_u64(self.entry.len() as u64);
        for id in &self.source_ids {
            buf.put_u64(*id);
        }
        buf.put_slice(&self.entry);
        Ok(buf.freeze())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(body);
        let version = r.u32("version")?;
        let count = r.u16("source count")?;
        let entry_len = r.u64("entry length")?;
        let source_ids = (0..count)
            .map(|_| r.u64("source id"))
            .collect::<Result<Vec<_>>>()?;
        let entry_len = usize::try_from(entry_len)
            .map_err(|_| CodecError::malformed("entry length overflows usize"))?;
        let entry = Bytes::copy_from_slice(r.take(entry_len, "synthesized entry")?);
        r.finish("synthesis payload")?;
        Ok(Self {
            version,
            source_ids,
            entry,
        })
    }
}

/// Schema validation result (0x6A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPayload {
    pub entry_id: u64,
    pub schema_id: u64,
    pub result: u8,
}

impl ValidationPayload {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(17);
        buf.put_u64(self.entry_id);
        buf.put_u64(self.schema_id);
        buf.put_u8(self.result);
        buf.freeze()
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(body);
        let out = Self {
            entry_id: r.u64("entry id")?,
            schema_id: r.u64("schema id")?,
            result: r.u8("validation result")?,
        };
        r.finish("validation payload")?;
        Ok(out)
    }
}

/// Partition to node assignments (0x6B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPayload {
    pub version: u32,
    pub assignments: Vec<(u64, NodeId)>,
}

impl PartitionPayload {
    pub fn encode(&self) -> Result<Bytes> {
        check_len("partition assignments", self.assignments.len(), U16_MAX)?;
        let mut buf =
            BytesMut::with_capacity(6 + self.assignments.len() * (8 + NODE_ID_WIRE_LEN));
        buf.put_u32(self.version);
        buf.put_u16(self.assignments.len() as u16);
        for (partition, node) in &self.assignments {
            buf.put_u64(*partition);
            buf.put_slice(&node.to_wire());
        }
        Ok(buf.freeze())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(body);
        let version = r.u32("version")?;
        let count = r.u16("assignment count")?;
        let mut assignments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let partition = r.u64("partition id")?;
            let node = NodeId::from_wire(&r.array::<NODE_ID_WIRE_LEN>("partition node")?);
            assignments.push((partition, node));
        }
        r.finish("partition payload")?;
        Ok(Self {
            version,
            assignments,
        })
    }
}

/// Reasoning trace attached to an entry (0x6C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePayload {
    pub entry_id: u64,
    pub trace: String,
}

impl TracePayload {
    pub fn encode(&self) -> Result<Bytes> {
        encode_id_and_text(self.entry_id, "reasoning trace", &self.trace)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let (entry_id, trace) = decode_id_and_text(body, "reasoning trace")?;
        Ok(Self { entry_id, trace })
    }
}

/// Causal provenance of an entry (0x50).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenancePayload {
    pub entry_id: u64,
    pub causal_chain: String,
}

impl ProvenancePayload {
    pub fn encode(&self) -> Result<Bytes> {
        encode_id_and_text(self.entry_id, "causal chain", &self.causal_chain)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let (entry_id, causal_chain) = decode_id_and_text(body, "causal chain")?;
        Ok(Self {
            entry_id,
            causal_chain,
        })
    }
}

fn encode_id_and_text(id: u64, field: &'static str, text: &str) -> Result<Bytes> {
    check_len(field, text.len(), U16_MAX)?;
    let mut buf = BytesMut::with_capacity(10 + text.len());
    buf.put_u64(id);
    buf.put_u16(text.len() as u16);
    buf.put_slice(text.as_bytes());
    Ok(buf.freeze())
}

fn decode_id_and_text(body: &[u8], field: &str) -> Result<(u64, String)> {
    let mut r = WireReader::new(body);
    let id = r.u64("entry id")?;
    let len = r.u16(field)? as usize;
    let text = r.utf8(len, field)?;
    r.finish(field)?;
    Ok((id, text))
}

/// Small urgent update for a range (0x6D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroBroadcastPayload {
    pub version: u32,
    pub range_start: u64,
    pub range_end: u64,
    pub micro_entry: [u8; SHORT_FIELD_LEN],
}

impl MicroBroadcastPayload {
    /// Fit `entry` into the fixed micro field, truncating or zero-padding.
    pub fn fit_entry(entry: &[u8]) -> [u8; SHORT_FIELD_LEN] {
        let mut out = [0u8; SHORT_FIELD_LEN];
        let n = entry.len().min(SHORT_FIELD_LEN);
        out[..n].copy_from_slice(&entry[..n]);
        out
    }

    pub fn encode(&self) -> Bytes {
        encode_range_tag(self.version, self.range_start, self.range_end, &self.micro_entry)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let (version, range_start, range_end, micro_entry) =
            decode_range_tag(body, "micro broadcast")?;
        Ok(Self {
            version,
            range_start,
            range_end,
            micro_entry,
        })
    }
}

/// Low-bandwidth range fingerprint (0x70).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightweightPayload {
    pub version: u32,
    pub range_start: u64,
    pub range_end: u64,
    pub fingerprint: [u8; SHORT_FIELD_LEN],
}

impl LightweightPayload {
    /// First eight bytes of SHA-256 over the concatenated entries.
    pub fn fingerprint_of<E: AsRef<[u8]>>(entries: &[E]) -> [u8; SHORT_FIELD_LEN] {
        let joined: Vec<u8> = entries
            .iter()
            .flat_map(|e| e.as_ref().iter().copied())
            .collect();
        let digest = sha256(&joined);
        let mut out = [0u8; SHORT_FIELD_LEN];
        out.copy_from_slice(&digest[..SHORT_FIELD_LEN]);
        out
    }

    pub fn encode(&self) -> Bytes {
        encode_range_tag(self.version, self.range_start, self.range_end, &self.fingerprint)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let (version, range_start, range_end, fingerprint) =
            decode_range_tag(body, "lightweight sync")?;
        Ok(Self {
            version,
            range_start,
            range_end,
            fingerprint,
        })
    }
}

fn encode_range_tag(version: u32, start: u64, end: u64, tag: &[u8; SHORT_FIELD_LEN]) -> Bytes {
    let mut buf = BytesMut::with_capacity(28);
    buf.put_u32(version);
    buf.put_u64(start);
    buf.put_u64(end);
    buf.put_slice(tag);
    buf.freeze()
}

fn decode_range_tag(body: &[u8], what: &str) -> Result<(u32, u64, u64, [u8; SHORT_FIELD_LEN])> {
    let mut r = WireReader::new(body);
    let version = r.u32("version")?;
    let start = r.u64("range start")?;
    let end = r.u64("range end")?;
    let tag = r.array("range tag")?;
    r.finish(what)?;
    Ok((version, start, end, tag))
}

/// Alignment score and safety flag (0x6E).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EthicsPayload {
    pub entry_id: u64,
    pub alignment_score: f32,
    pub safety_flag: u8,
}

impl EthicsPayload {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(13);
        buf.put_u64(self.entry_id);
        buf.put_f32(self.alignment_score);
        buf.put_u8(self.safety_flag);
        buf.freeze()
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(body);
        let out = Self {
            entry_id: r.u64("entry id")?,
            alignment_score: r.f32("alignment score")?,
            safety_flag: r.u8("safety flag")?,
        };
        r.finish("ethics payload")?;
        Ok(out)
    }
}

/// Opaque payload for a foreign protocol (0x6F).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterPayload {
    pub protocol: String,
    pub inner: Bytes,
}

impl AdapterPayload {
    pub fn encode(&self) -> Result<Bytes> {
        check_len("protocol name", self.protocol.len(), U16_MAX)?;
        let mut buf = BytesMut::with_capacity(2 + self.protocol.len() + self.inner.len());
        buf.put_u16(self.protocol.len() as u16);
        buf.put_slice(self.protocol.as_bytes());
        buf.put_slice(&self.inner);
        Ok(buf.freeze())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(body);
        let len = r.u16("protocol length")? as usize;
        let protocol = r.utf8(len, "protocol name")?;
        let inner = Bytes::copy_from_slice(r.rest());
        Ok(Self { protocol, inner })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Error response (0xE0)
// ────────────────────────────────────────────────────────────────────────────

/// Decoded error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub correlation_id: u64,
    pub original_type: u8,
    /// Raw code; peers may send codes this node does not know.
    pub code: u16,
    pub message: String,
}

impl ErrorPayload {
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u16(self.code)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(body);
        let correlation_id = r.u64("correlation id")?;
        let original_type = r.u8("original type")?;
        let code = r.u16("error code")?;
        let len = r.u16("message length")? as usize;
        let message = r.utf8(len, "error message")?;
        r.finish("error payload")?;
        Ok(Self {
            correlation_id,
            original_type,
            code,
            message,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatch by kind
// ────────────────────────────────────────────────────────────────────────────

/// A packet payload interpreted according to its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    Provenance(ProvenancePayload),
    FullSync(SyncPayload),
    KnowledgeSynthesis(SynthesisPayload),
    SemanticValidation(ValidationPayload),
    PartitionDirectory(PartitionPayload),
    ReasoningTrace(TracePayload),
    PriorityBroadcast(MicroBroadcastPayload),
    EthicsCheck(EthicsPayload),
    ProtocolAdapter(AdapterPayload),
    LightweightSync(LightweightPayload),
    ErrorResponse(ErrorPayload),
    /// A kind this node does not interpret.
    Unknown(u8),
}

impl PacketBody {
    /// Interpret a packet's payload, stripping the signature trailer for
    /// signed kinds.
    pub fn parse(packet: &Packet) -> Result<Self> {
        let kind = packet.kind();
        if let PacketKind::Unknown(id) = kind {
            return Ok(Self::Unknown(id));
        }
        if kind == PacketKind::ErrorResponse {
            return ErrorPayload::decode(packet.payload()).map(Self::ErrorResponse);
        }

        let signed = SignedPayload::parse(packet.payload())?;
        Self::parse_body(kind, signed.body())
    }

    /// Interpret an unsigned body of the given kind.
    pub fn parse_body(kind: PacketKind, body: &[u8]) -> Result<Self> {
        Ok(match kind.canonical() {
            PacketKind::Provenance => Self::Provenance(ProvenancePayload::decode(body)?),
            PacketKind::FullSync => Self::FullSync(SyncPayload::decode(body)?),
            PacketKind::KnowledgeSynthesis => {
                Self::KnowledgeSynthesis(SynthesisPayload::decode(body)?)
            }
            PacketKind::SemanticValidation => {
                Self::SemanticValidation(ValidationPayload::decode(body)?)
            }
            PacketKind::PartitionDirectory => {
                Self::PartitionDirectory(PartitionPayload::decode(body)?)
            }
            PacketKind::ReasoningTrace => Self::ReasoningTrace(TracePayload::decode(body)?),
            PacketKind::PriorityBroadcast => {
                Self::PriorityBroadcast(MicroBroadcastPayload::decode(body)?)
            }
            PacketKind::EthicsCheck => Self::EthicsCheck(EthicsPayload::decode(body)?),
            PacketKind::ProtocolAdapter => Self::ProtocolAdapter(AdapterPayload::decode(body)?),
            PacketKind::LightweightSync => {
                Self::LightweightSync(LightweightPayload::decode(body)?)
            }
            PacketKind::ErrorResponse => Self::ErrorResponse(ErrorPayload::decode(body)?),
            PacketKind::Unknown(id) => Self::Unknown(id),
        })
    }
}
