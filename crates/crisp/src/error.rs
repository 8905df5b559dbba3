//! Error types for the node façade.

use crisp_core::CodecError;
use crisp_store::StoreError;
use crisp_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
///
/// Only locally initiated operations return these. Inbound packets are
/// answered with error packets instead.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Packet could not be built.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
