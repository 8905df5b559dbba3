//! # CRISP Store
//!
//! Storage seams for CRISP nodes.
//!
//! ## Key Types
//!
//! - [`SyncStore`] - Trait for sync records, votes, and the deadlock audit
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`EvictionCache`] - Bounded LRU cache for hot ranges
//! - [`RangeIndex`] - Ordered lookup by range start
//!
//! ## Design Notes
//!
//! - **Synchronous**: conflict resolution reads then writes under the
//!   node's exclusive borrow, so the store API is plain blocking calls.
//! - **Opaque packets**: records hold encoded packet bytes; decoding is the
//!   caller's job.

pub mod cache;
pub mod error;
pub mod index;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use cache::EvictionCache;
pub use error::{Result, StoreError};
pub use index::RangeIndex;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{DeadlockRecord, SyncStore};
