//! Attribute paths (`A`): an ordered sequence of segments,
//! prefixed by the owning collection name.
//!
//! A path segment is either a record field key or, for set membership
//! triples, the canonical JSON encoding of the member value (so the member
//! itself is recoverable by re-parsing the segment as JSON).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributePath(Vec<String>);

impl AttributePath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The collection-prefixed path for a scalar leaf: `[collection, ...field_path]`.
    pub fn for_field(collection: &str, field_path: &[String]) -> Self {
        let mut segments = Vec::with_capacity(field_path.len() + 1);
        segments.push(collection.to_string());
        segments.extend(field_path.iter().cloned());
        Self(segments)
    }

    /// The collection-prefixed path for a set member triple:
    /// `[collection, ...field_path, member_segment]`.
    pub fn for_set_member(collection: &str, field_path: &[String], member: &JsonValue) -> Self {
        let mut segments = Vec::with_capacity(field_path.len() + 2);
        segments.push(collection.to_string());
        segments.extend(field_path.iter().cloned());
        segments.push(encode_member(member));
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Drop the trailing segment, interpreting it as a set member value.
    /// Returns `None` if the path is empty.
    pub fn last_as_member(&self) -> Option<JsonValue> {
        self.0.last().and_then(|s| decode_member(s))
    }
}

pub(crate) fn encode_member(value: &JsonValue) -> String {
    serde_json::to_string(value).expect("JsonValue serialization never fails")
}

pub(crate) fn decode_member(segment: &str) -> Option<JsonValue> {
    serde_json::from_str(segment).ok()
}
