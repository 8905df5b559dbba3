//! # CRISP Testkit
//!
//! Testing utilities for CRISP nodes.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known packets with their exact wire bytes
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Deterministic identities and in-memory nodes
//!
//! ## Golden Vectors
//!
//! ```rust
//! use crisp_testkit::vectors::{all_vectors, build_packet};
//!
//! for vector in all_vectors() {
//!     let packet = build_packet(&vector);
//!     assert_eq!(hex::encode(packet.encode()), vector.wire_hex);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use crisp::NodeConfig;
//! use crisp_testkit::fixtures::{connect, multi_party_fixtures};
//!
//! let parties = multi_party_fixtures(3);
//! let mut nodes: Vec<_> = parties.iter().map(|p| p.node(NodeConfig::default())).collect();
//! connect(&mut nodes);
//! assert_eq!(nodes[0].neighbors().len(), 2);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{connect, deliver, multi_party_fixtures, TestFixture, TestNode};
