//! Document codec (C4): plain document -> triples -> timestamped tree ->
//! plain document.
//!
//! Encoding never needs a schema: a JSON array in the input document is
//! always a `Set`, a JSON object is always a nested `Record`, anything else
//! is a scalar leaf. Decoding goes through an explicit timestamped
//! intermediate ([`TimestampedObject`]) rather than straight back to plain
//! JSON, so a caller that cares about per-field provenance (last-writer
//! timestamps) can inspect it before [`timestamped_to_plain`] discards that
//! information. Reconstructing plain JSON from a flat triple list relies on
//! recognizing set-member path segments: a segment is a set member iff it
//! round-trips through JSON (`encode_member`/`decode_member` in
//! [`crate::path`]), which is never true of a record field key produced by
//! this encoder. A collection whose own field names happen to be bare JSON
//! literals (`"true"`, `"123"`) would confuse this heuristic; schema-driven
//! callers should prefer reading known attributes directly through
//! [`crate::store::TripleStore`] instead of this generic decoder.

use crate::entity::EntityId;
use crate::path::AttributePath;
use crate::triple::Triple;
use crate::value::Value;
use serde_json::Map;
use std::collections::BTreeMap;
use tridb_clock::HybridTimestamp;

const COLLECTION_MARKER: &str = "_collection";

/// One timestamped scalar value: the last-writer value and when it was
/// written.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedLeaf {
    pub value: Value,
    pub ts: HybridTimestamp,
}

/// A set's members as of the latest write to each: segment-encoded member
/// key to its `{ value: bool, ts }` leaf. `true` means the member is
/// currently present; `false` means it was explicitly removed (and is still
/// "live" in the sense of having a current value, just not a member).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimestampedSet(pub BTreeMap<String, TimestampedLeaf>);

/// One field of a [`TimestampedObject`]: a scalar leaf, a nested record, or
/// a set.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampedNode {
    Leaf(TimestampedLeaf),
    Object(TimestampedObject),
    Set(TimestampedSet),
}

/// The nested-object reduction of an entity's triples: every live
/// `(attribute, value, timestamp)` folded into a tree keyed by field name,
/// ordered for determinism.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimestampedObject(pub BTreeMap<String, TimestampedNode>);

/// Explode a plain document into triples, including the `_collection`
/// marker. `document`'s top-level keys are field names relative to the
/// collection (an `id` key, if present, is not itself re-encoded — entity
/// identity lives in `entity`, not in a triple).
pub fn plain_to_triples(
    collection: &str,
    entity: &EntityId,
    document: &Map<String, Value>,
    timestamp: &HybridTimestamp,
) -> Vec<Triple> {
    let mut out = Vec::new();
    out.push(Triple::new(
        entity.clone(),
        AttributePath::new(vec![COLLECTION_MARKER.to_string()]),
        Value::String(collection.to_string()),
        timestamp.clone(),
    ));
    for (key, value) in document {
        if key == "id" {
            continue;
        }
        encode_value(collection, entity, &mut vec![key.clone()], value, timestamp, &mut out);
    }
    out
}

pub(crate) fn encode_value(
    collection: &str,
    entity: &EntityId,
    field_path: &mut Vec<String>,
    value: &Value,
    timestamp: &HybridTimestamp,
    out: &mut Vec<Triple>,
) {
    match value {
        Value::Array(members) => {
            for member in members {
                let path = AttributePath::for_set_member(collection, field_path, member);
                out.push(Triple::new(entity.clone(), path, Value::Bool(true), timestamp.clone()));
            }
        }
        Value::Object(fields) => {
            for (key, nested) in fields {
                field_path.push(key.clone());
                encode_value(collection, entity, field_path, nested, timestamp, out);
                field_path.pop();
            }
        }
        scalar => {
            let path = AttributePath::for_field(collection, field_path);
            out.push(Triple::new(entity.clone(), path, scalar.clone(), timestamp.clone()));
        }
    }
}

/// Reduce an entity's currently-live `(attribute, value, timestamp)`
/// entries (as returned by [`crate::store::TripleStore::entity_current_triples`])
/// into a [`TimestampedObject`], dropping the `_collection` marker and the
/// leading collection-name segment every field path carries.
pub fn triples_to_timestamped(entries: &[(AttributePath, Value, HybridTimestamp)]) -> TimestampedObject {
    let mut root = TimestampedObject::default();
    for (path, value, ts) in entries {
        let segments = path.segments();
        if segments == [COLLECTION_MARKER.to_string()] {
            continue;
        }
        let field_path = &segments[1..];
        if field_path.is_empty() {
            continue;
        }
        let leaf = TimestampedLeaf { value: value.clone(), ts: ts.clone() };
        if path.last_as_member().is_some() {
            let stem = &field_path[..field_path.len() - 1];
            let member_key = field_path.last().unwrap().clone();
            insert_set_member(&mut root, stem, member_key, leaf);
        } else {
            insert_leaf(&mut root, field_path, leaf);
        }
    }
    root
}

fn insert_leaf(object: &mut TimestampedObject, path: &[String], leaf: TimestampedLeaf) {
    if path.len() == 1 {
        object.0.insert(path[0].clone(), TimestampedNode::Leaf(leaf));
        return;
    }
    let entry = object.0.entry(path[0].clone()).or_insert_with(|| TimestampedNode::Object(TimestampedObject::default()));
    if let TimestampedNode::Object(nested) = entry {
        insert_leaf(nested, &path[1..], leaf);
    }
}

fn insert_set_member(object: &mut TimestampedObject, stem: &[String], member_key: String, leaf: TimestampedLeaf) {
    if stem.len() == 1 {
        let entry = object.0.entry(stem[0].clone()).or_insert_with(|| TimestampedNode::Set(TimestampedSet::default()));
        if let TimestampedNode::Set(set) = entry {
            set.0.insert(member_key, leaf);
        }
        return;
    }
    let entry = object.0.entry(stem[0].clone()).or_insert_with(|| TimestampedNode::Object(TimestampedObject::default()));
    if let TimestampedNode::Object(nested) = entry {
        insert_set_member(nested, &stem[1..], member_key, leaf);
    }
}

/// Drop timestamps; for sets, keep only members whose latest value is
/// `true`.
pub fn timestamped_to_plain(entity: &EntityId, object: &TimestampedObject) -> Map<String, Value> {
    let mut doc = object_to_map(object);
    doc.insert("id".to_string(), Value::String(entity.external_id().to_string()));
    doc
}

fn object_to_map(object: &TimestampedObject) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, node) in &object.0 {
        map.insert(key.clone(), node_to_value(node));
    }
    map
}

fn node_to_value(node: &TimestampedNode) -> Value {
    match node {
        TimestampedNode::Leaf(leaf) => leaf.value.clone(),
        TimestampedNode::Object(nested) => Value::Object(object_to_map(nested)),
        TimestampedNode::Set(set) => {
            let members = set
                .0
                .iter()
                .filter(|(_, leaf)| leaf.value == Value::Bool(true))
                .filter_map(|(segment, _)| crate::path::decode_member(segment))
                .collect();
            Value::Array(members)
        }
    }
}

/// `plain_to_triples` then straight back through the timestamped
/// intermediate to plain JSON, for callers (tests, mostly) that don't need
/// the intermediate themselves.
pub fn decode_document(entity: &EntityId, entries: &[(AttributePath, Value, HybridTimestamp)]) -> Map<String, Value> {
    timestamped_to_plain(entity, &triples_to_timestamped(entries))
}
