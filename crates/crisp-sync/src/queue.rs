//! Outbound dispatch of encoded packets.
//!
//! The node hands every outbound packet to a [`SendQueue`] together with a
//! priority. Delivery is the queue's business: a real deployment drains it
//! into sockets, tests drain it by hand.

use async_trait::async_trait;
use bytes::Bytes;

use crisp_core::{NodeId, Priority};

use crate::error::Result;

/// Prioritized outbound channel to peers.
#[async_trait]
pub trait SendQueue: Send + Sync {
    /// Enqueue an encoded packet for `peer`.
    async fn send(&self, peer: &NodeId, priority: Priority, packet: Bytes) -> Result<()>;
}

/// An in-memory queue for tests and single-process simulations.
pub mod memory {
    use super::*;
    use std::cmp::Ordering;
    use std::collections::{BinaryHeap, HashSet};
    use tokio::sync::Mutex;

    use crate::error::SyncError;

    /// A packet waiting in the queue.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Outbound {
        pub peer: NodeId,
        pub priority: Priority,
        pub packet: Bytes,
        order: u64,
    }

    impl Ord for Outbound {
        fn cmp(&self, other: &Self) -> Ordering {
            // Max-heap: higher priority first, then earlier enqueue.
            self.priority
                .cmp(&other.priority)
                .then_with(|| other.order.cmp(&self.order))
        }
    }

    impl PartialOrd for Outbound {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    #[derive(Debug, Default)]
    struct State {
        heap: BinaryHeap<Outbound>,
        next_order: u64,
        unreachable: HashSet<NodeId>,
    }

    /// Highest priority first, FIFO within a priority.
    #[derive(Debug, Default)]
    pub struct MemorySendQueue {
        state: Mutex<State>,
    }

    impl MemorySendQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make sends to `peer` fail from now on.
        pub async fn mark_unreachable(&self, peer: NodeId) {
            self.state.lock().await.unreachable.insert(peer);
        }

        /// Take the next packet to deliver.
        pub async fn pop(&self) -> Option<Outbound> {
            self.state.lock().await.heap.pop()
        }

        /// Take every queued packet in delivery order.
        pub async fn drain(&self) -> Vec<Outbound> {
            let mut state = self.state.lock().await;
            let mut out = Vec::with_capacity(state.heap.len());
            while let Some(item) = state.heap.pop() {
                out.push(item);
            }
            out
        }

        pub async fn len(&self) -> usize {
            self.state.lock().await.heap.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.state.lock().await.heap.is_empty()
        }
    }

    #[async_trait]
    impl SendQueue for MemorySendQueue {
        async fn send(&self, peer: &NodeId, priority: Priority, packet: Bytes) -> Result<()> {
            let mut state = self.state.lock().await;
            if state.unreachable.contains(peer) {
                return Err(SyncError::PeerUnreachable(peer.clone()));
            }
            let order = state.next_order;
            state.next_order += 1;
            state.heap.push(Outbound {
                peer: peer.clone(),
                priority,
                packet,
                order,
            });
            Ok(())
        }
    }
}
