//! # CRISP
//!
//! The node API for CRISP: peers that keep a shared knowledge cache in sync
//! with signed, checksummed packets.
//!
//! ## Overview
//!
//! An [`SkcNode`] provides:
//!
//! - **Range sync**: entries are folded into a Merkle integrity tree, stamped
//!   with a vector clock, signed, stored, and gossiped
//! - **Inbound resolution**: packets are checksummed, signature checked, then
//!   conflict-voted or accepted, with deadlocks recorded for audit
//! - **Hot ranges**: ranges synced often are promoted in priority and cached
//! - **Builders**: signed packets for synthesis, validation, partitions,
//!   traces, broadcasts, ethics checks, adapters, lightweight sync, and
//!   provenance
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crisp::{NodeConfig, SkcNode};
//! use crisp::core::{Keypair, NodeId, Priority};
//! use crisp::store::SqliteStore;
//! use crisp::sync::MemorySendQueue;
//!
//! async fn example() {
//!     let store = SqliteStore::open("node.db").unwrap();
//!     let mut node = SkcNode::new(
//!         NodeId::new("node1"),
//!         Keypair::generate(),
//!         store,
//!         MemorySendQueue::new(),
//!         NodeConfig::default(),
//!     );
//!     node.add_neighbor(NodeId::new("node2"));
//!
//!     let packet = node
//!         .sync_range(1000, 2000, &[br#"{"fact":"x"}"#.as_slice()], Priority::NORMAL)
//!         .await
//!         .unwrap();
//!     println!("synced seq {}", packet.sequence());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `crisp::core` - Packet codec, integrity tree, clocks, signatures
//! - `crisp::store` - Storage trait, SQLite and memory backends, caches
//! - `crisp::sync` - Conflict resolution and the outbound queue

pub mod config;
pub mod error;
pub mod node;
pub mod peers;

pub use crisp_core as core;
pub use crisp_store as store;
pub use crisp_sync as sync;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::{dispatch_priority, SkcNode, FAST_SYNC_INTERVAL, SLOW_SYNC_INTERVAL};
pub use peers::PeerDirectory;

pub use crisp_core::{
    ChecksumKind, ErrorCode, Keypair, NodeId, Packet, PacketBody, PacketKind, Priority,
};
