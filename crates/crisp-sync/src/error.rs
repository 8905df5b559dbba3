//! Error types for the sync module.

use thiserror::Error;

use crisp_core::NodeId;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The send queue cannot reach the peer.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(NodeId),

    /// The send queue was closed.
    #[error("send queue closed")]
    QueueClosed,

    /// Store operation failed.
    #[error("store error: {0}")]
    StoreError(#[from] crisp_store::StoreError),

    /// Packet could not be built or parsed.
    #[error("codec error: {0}")]
    CodecError(#[from] crisp_core::CodecError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
