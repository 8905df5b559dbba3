//! # CRISP Sync
//!
//! Decides what a node does with inbound packets and how outbound packets
//! are queued.
//!
//! ## Key Types
//!
//! - [`ConflictResolver`] - Conflict voting and deadlock detection
//! - [`ReputationTable`] - Vote weights per node
//! - [`SendQueue`] - Async outbound channel, with [`MemorySendQueue`] for tests
//!
//! ## Resolution Flow
//!
//! ```text
//! inbound ──► parse ──► lookup (full sync) ──► compare digests
//!                                                 │
//!                        deadlock check ◄─equal───┤
//!                                                 └─differ──► vote
//! ```

pub mod error;
pub mod queue;
pub mod reputation;
pub mod resolver;

pub use error::{Result, SyncError};
pub use queue::{memory::MemorySendQueue, memory::Outbound, SendQueue};
pub use reputation::{ReputationTable, DEFAULT_REPUTATION};
pub use resolver::{ConflictResolver, Outcome, Resolution, VoteTally, DEFAULT_DEADLOCK_EXPIRY};
