//! # CRISP Core
//!
//! Pure primitives for CRISP shared-knowledge-cache synchronization: the
//! packet codec, integrity tree, vector clocks, and quorum signatures.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Packet`] - The unit of exchange between peers
//! - [`PacketKind`] - Discriminator for payload interpretation
//! - [`IntegrityTree`] - Merkle digest over synchronized entries
//! - [`VectorClock`] - Bounded causal summary attached to sync packets
//! - [`SignedPayload`] - Body plus multi-signature trailer
//!
//! ## Wire Format
//!
//! Packets are a 12-byte big-endian header followed by the payload. See
//! [`packet`] for the layout and [`payload`] for per-kind bodies.

pub mod checksum;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod packet;
pub mod payload;
pub mod quorum;
pub mod types;

mod wire;

pub use checksum::ChecksumKind;
pub use clock::{Causality, VectorClock};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CodecError, ErrorCode};
pub use merkle::{IntegrityTree, MerkleDigest};
pub use packet::{Packet, PacketBuilder, PacketHeader, PacketKind, HEADER_SIZE};
pub use payload::PacketBody;
pub use quorum::{QuorumPolicy, SignedPayload};
pub use types::{now_millis, NodeId, Priority};
