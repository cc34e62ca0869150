//! The triple type: `(E, A, V, T, expired?)`.

use crate::entity::EntityId;
use crate::path::AttributePath;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tridb_clock::HybridTimestamp;

/// One fact: entity, attribute path, value, timestamp, and tombstone flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub entity: EntityId,
    pub attribute: AttributePath,
    pub value: Value,
    pub timestamp: HybridTimestamp,
    pub expired: bool,
}

impl Triple {
    pub fn new(
        entity: EntityId,
        attribute: AttributePath,
        value: Value,
        timestamp: HybridTimestamp,
    ) -> Self {
        Self {
            entity,
            attribute,
            value,
            timestamp,
            expired: false,
        }
    }

    /// A tombstone at the same coordinates, dated `timestamp`.
    pub fn tombstone(entity: EntityId, attribute: AttributePath, timestamp: HybridTimestamp) -> Self {
        Self {
            entity,
            attribute,
            value: Value::Null,
            timestamp,
            expired: true,
        }
    }
}

/// The part of a [`Triple`] stored as the KV value. The key's trailing
/// segments (tick, client_id) exist only to keep multiple triples at the
/// same `(E, A)` from colliding and to sort history in timestamp order; the
/// timestamp is also carried here so readers never have to parse it back
/// out of key bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTripleValue {
    pub attribute: AttributePath,
    pub value: Value,
    pub expired: bool,
    pub timestamp: HybridTimestamp,
}

impl StoredTripleValue {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("StoredTripleValue serialization never fails")
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
