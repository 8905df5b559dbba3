//! Strong type definitions shared across CRISP.
//!
//! Identifiers and priorities are newtypes so they cannot be mixed up with
//! plain strings and integers at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a node identifier on the wire.
pub const NODE_ID_WIRE_LEN: usize = 32;

/// Identifier of a node in the SKC network.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed-width wire form: UTF-8 bytes, NUL-padded, truncated to 32 bytes.
    pub fn to_wire(&self) -> [u8; NODE_ID_WIRE_LEN] {
        let mut out = [0u8; NODE_ID_WIRE_LEN];
        let bytes = self.0.as_bytes();
        let n = bytes.len().min(NODE_ID_WIRE_LEN);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    /// Parse the fixed-width wire form, dropping NUL padding.
    pub fn from_wire(bytes: &[u8; NODE_ID_WIRE_LEN]) -> Self {
        let end = bytes
            .iter()
            .rposition(|b| *b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        Self(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Dispatch priority of a packet. Higher values are sent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Default priority for ordinary traffic.
    pub const NORMAL: Self = Self(0x00);
    /// Error responses and other control traffic.
    pub const ELEVATED: Self = Self(0x01);
    /// Ranges that crossed the hotness threshold.
    pub const HOT: Self = Self(0x02);
    /// Priority micro-broadcasts.
    pub const URGENT: Self = Self(0x03);

    /// Raw wire value.
    pub const fn to_u8(self) -> u8 {
        self.0
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
