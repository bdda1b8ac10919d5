//! Wire codec for document updates and snapshots.
//!
//! Updates travel as opaque byte frames: JSON-encoded entry lists sent as
//! WebSocket binary messages, distinct from the text frames the command
//! channel uses. The server merges and rebroadcasts them without caring
//! what is inside; only replicas interpret the entries.

#[cfg(test)]
#[path = "update_test.rs"]
mod update_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Stamp;
use crate::document::{Snapshot, Table};

/// Error returned when decoding bytes off the wire or out of the store.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode update frame: {0}")]
    Update(#[source] serde_json::Error),
    #[error("failed to decode document snapshot: {0}")]
    Snapshot(#[source] serde_json::Error),
}

/// One stamped write inside an update. `value: None` is a deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub table: Table,
    pub key: String,
    pub stamp: Stamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A set of stamped writes: either the delta of one transaction or a
/// replica's full state (graves included) during reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Update {
    pub entries: Vec<UpdateEntry>,
}

impl Update {
    /// True if the update carries no writes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode for the wire.
    ///
    /// # Panics
    ///
    /// Never panics in practice: entries contain only JSON-representable
    /// data by construction.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("update serializes to JSON")
    }

    /// Decode an update frame received off the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Update)
    }
}

/// Encode a snapshot for the durable store.
///
/// # Panics
///
/// Never panics in practice: snapshots contain only JSON-representable
/// data by construction.
#[must_use]
pub fn encode_snapshot(snapshot: &Snapshot) -> Vec<u8> {
    serde_json::to_vec(snapshot).expect("snapshot serializes to JSON")
}

/// Decode a snapshot loaded from the durable store.
pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Snapshot)
}
