//! The triple store (C3): two independent indexes over [`tridb_kv::KvStore`]
//! — `eav` (by entity, then attribute) for single-entity reads, and `ave`
//! (by attribute, then entity) for the attribute-wide scans the
//! data-safety checker needs.
//!
//! Triples are never overwritten in place. A write appends a new triple at
//! a later timestamp; the "current" value at a path is the non-expired
//! triple with the greatest timestamp among those sharing that `(E, A)`.
//! Deleting an entity writes a fresh tombstone triple over every attribute
//! it currently has, rather than mutating history.

use crate::entity::EntityId;
use crate::path::AttributePath;
use crate::triple::{StoredTripleValue, Triple};
use crate::value::Value;
use std::collections::BTreeMap;
use tridb_clock::HybridTimestamp;
use tridb_errors::Result;
use tridb_kv::{Key, KvTransaction, Segment};

const EAV: &str = "eav";
const AVE: &str = "ave";

fn eav_key(entity: &EntityId, attribute: &AttributePath, ts: &HybridTimestamp) -> Key {
    let mut segments = vec![
        Segment::Str(EAV.to_string()),
        Segment::Str(entity.collection().to_string()),
        Segment::Str(entity.external_id().to_string()),
    ];
    segments.extend(attribute.segments().iter().map(|s| Segment::Str(s.clone())));
    segments.push(Segment::U64(ts.tick));
    segments.push(Segment::Str(ts.client_id.to_string()));
    Key::from_segments(segments)
}

fn eav_prefix_entity(entity: &EntityId) -> Key {
    Key::from_segments([
        Segment::Str(EAV.to_string()),
        Segment::Str(entity.collection().to_string()),
        Segment::Str(entity.external_id().to_string()),
    ])
}

fn eav_prefix_attribute(entity: &EntityId, attribute: &AttributePath) -> Key {
    let mut segments = vec![
        Segment::Str(EAV.to_string()),
        Segment::Str(entity.collection().to_string()),
        Segment::Str(entity.external_id().to_string()),
    ];
    segments.extend(attribute.segments().iter().map(|s| Segment::Str(s.clone())));
    Key::from_segments(segments)
}

fn eav_prefix_collection(collection: &str) -> Key {
    Key::from_segments([Segment::Str(EAV.to_string()), Segment::Str(collection.to_string())])
}

fn ave_key(entity: &EntityId, attribute: &AttributePath, ts: &HybridTimestamp) -> Key {
    // `attribute.segments()` already starts with the collection name
    // (`AttributePath` is always collection-prefixed); skip it here since
    // the collection is already a dedicated segment above, matching
    // `ave_prefix_attribute`'s collection-relative `field_path`.
    let mut segments = vec![
        Segment::Str(AVE.to_string()),
        Segment::Str(entity.collection().to_string()),
    ];
    segments.extend(attribute.segments()[1..].iter().map(|s| Segment::Str(s.clone())));
    segments.push(Segment::Str(entity.external_id().to_string()));
    segments.push(Segment::U64(ts.tick));
    segments.push(Segment::Str(ts.client_id.to_string()));
    Key::from_segments(segments)
}

fn ave_prefix_attribute(collection: &str, field_path: &[String]) -> Key {
    let mut segments = vec![Segment::Str(AVE.to_string()), Segment::Str(collection.to_string())];
    segments.extend(field_path.iter().map(|s| Segment::Str(s.clone())));
    Key::from_segments(segments)
}

/// Stateless facade over the two indexes. All methods take the transaction
/// explicitly; `TripleStore` holds no data of its own.
pub struct TripleStore;

impl TripleStore {
    /// Append `triples`, writing each into both indexes.
    pub fn write(tx: &mut dyn KvTransaction, triples: &[Triple]) -> Result<()> {
        for triple in triples {
            let stored = StoredTripleValue {
                attribute: triple.attribute.clone(),
                value: triple.value.clone(),
                expired: triple.expired,
                timestamp: triple.timestamp.clone(),
            };
            let bytes = stored.encode();
            tx.put(eav_key(&triple.entity, &triple.attribute, &triple.timestamp), bytes.clone());
            tx.put(ave_key(&triple.entity, &triple.attribute, &triple.timestamp), bytes);
        }
        Ok(())
    }

    /// The current (max-timestamp, non-expired) value at `(entity, attribute)`.
    pub fn current_value(
        tx: &mut dyn KvTransaction,
        entity: &EntityId,
        attribute: &AttributePath,
    ) -> Result<Option<(Value, HybridTimestamp)>> {
        let rows = tx.range(&eav_prefix_attribute(entity, attribute))?;
        let best = latest_non_expired(rows)?;
        Ok(best.map(|s| (s.value, s.timestamp)))
    }

    /// Every currently-live `(attribute, value, timestamp)` for `entity`,
    /// one entry per distinct attribute path (the max-timestamp, non-expired
    /// triple at that path).
    pub fn entity_current_triples(
        tx: &mut dyn KvTransaction,
        entity: &EntityId,
    ) -> Result<Vec<(AttributePath, Value, HybridTimestamp)>> {
        let rows = tx.range(&eav_prefix_entity(entity))?;
        let grouped = group_latest_by_attribute(rows)?;
        Ok(grouped
            .into_values()
            .map(|s| (s.attribute, s.value, s.timestamp))
            .collect())
    }

    /// Every external id in `collection` with at least one currently-live
    /// attribute (i.e. some attribute whose latest triple is non-expired).
    pub fn collection_entity_ids(tx: &mut dyn KvTransaction, collection: &str) -> Result<Vec<String>> {
        let rows = tx.range(&eav_prefix_collection(collection))?;
        let mut latest: BTreeMap<(String, AttributePath), StoredTripleValue> = BTreeMap::new();
        for (key, bytes) in rows {
            let stored = StoredTripleValue::decode(&bytes)?;
            let external_id = decode_external_id_segment(&key, 2)?;
            let group_key = (external_id, stored.attribute.clone());
            match latest.get(&group_key) {
                Some(existing) if existing.timestamp >= stored.timestamp => {}
                _ => {
                    latest.insert(group_key, stored);
                }
            }
        }
        let mut ids = std::collections::BTreeSet::new();
        for ((external_id, _), stored) in latest {
            if !stored.expired {
                ids.insert(external_id);
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Current `(entity, value, timestamp)` for every entity in `collection`
    /// that has a live triple at `field_path` (collection-relative, i.e.
    /// without the leading collection-name segment).
    pub fn scan_attribute(
        tx: &mut dyn KvTransaction,
        collection: &str,
        field_path: &[String],
    ) -> Result<Vec<(EntityId, Value, HybridTimestamp)>> {
        let rows = tx.range(&ave_prefix_attribute(collection, field_path))?;
        let mut by_external_id: BTreeMap<String, StoredTripleValue> = BTreeMap::new();
        let prefix_segment_count = 2 + field_path.len();
        for (key, bytes) in rows {
            let stored = StoredTripleValue::decode(&bytes)?;
            let external_id = decode_external_id_segment(&key, prefix_segment_count)?;
            match by_external_id.get(&external_id) {
                Some(existing) if existing.timestamp >= stored.timestamp => {}
                _ => {
                    by_external_id.insert(external_id, stored);
                }
            }
        }
        let mut out = Vec::new();
        for (external_id, stored) in by_external_id {
            if stored.expired {
                continue;
            }
            let entity = EntityId::new(collection, external_id)?;
            out.push((entity, stored.value, stored.timestamp));
        }
        Ok(out)
    }

    /// Current set members per entity at `field_path` (the set's own path,
    /// without a member suffix) — every entity in `collection` with at
    /// least one live member, paired with that member's current values.
    /// Unlike [`scan_attribute`](Self::scan_attribute), which assumes
    /// `field_path` names a single scalar attribute, this groups by the
    /// full (entity, member) attribute so distinct members of the same
    /// entity don't shadow each other.
    pub fn scan_set_members(
        tx: &mut dyn KvTransaction,
        collection: &str,
        field_path: &[String],
    ) -> Result<Vec<(EntityId, Vec<Value>)>> {
        let rows = tx.range(&ave_prefix_attribute(collection, field_path))?;
        // One more segment than a scalar scan skips: the member value
        // itself sits between the field path and the external id in an
        // `ave` key for a set triple.
        let prefix_segment_count = 2 + field_path.len() + 1;
        let mut latest: BTreeMap<(String, AttributePath), StoredTripleValue> = BTreeMap::new();
        for (key, bytes) in rows {
            let stored = StoredTripleValue::decode(&bytes)?;
            let external_id = decode_external_id_segment(&key, prefix_segment_count)?;
            let group_key = (external_id, stored.attribute.clone());
            match latest.get(&group_key) {
                Some(existing) if existing.timestamp >= stored.timestamp => {}
                _ => {
                    latest.insert(group_key, stored);
                }
            }
        }
        let mut by_entity: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for ((external_id, attribute), stored) in latest {
            if stored.expired || stored.value == Value::Bool(false) {
                continue;
            }
            if let Some(member) = attribute.last_as_member() {
                by_entity.entry(external_id).or_default().push(member);
            }
        }
        let mut out = Vec::new();
        for (external_id, members) in by_entity {
            out.push((EntityId::new(collection, external_id)?, members));
        }
        Ok(out)
    }

    /// Write a tombstone over every currently-live attribute of `entity`.
    pub fn tombstone_entity(
        tx: &mut dyn KvTransaction,
        entity: &EntityId,
        timestamp: &HybridTimestamp,
    ) -> Result<()> {
        let current = Self::entity_current_triples(tx, entity)?;
        let tombstones: Vec<Triple> = current
            .into_iter()
            .map(|(attribute, _, _)| Triple::tombstone(entity.clone(), attribute, timestamp.clone()))
            .collect();
        Self::write(tx, &tombstones)
    }
}

fn latest_non_expired(rows: Vec<(Key, Vec<u8>)>) -> Result<Option<StoredTripleValue>> {
    let mut best: Option<StoredTripleValue> = None;
    for (_, bytes) in rows {
        let stored = StoredTripleValue::decode(&bytes)?;
        if stored.expired {
            continue;
        }
        if best.as_ref().map(|b| stored.timestamp > b.timestamp).unwrap_or(true) {
            best = Some(stored);
        }
    }
    Ok(best)
}

fn group_latest_by_attribute(rows: Vec<(Key, Vec<u8>)>) -> Result<BTreeMap<AttributePath, StoredTripleValue>> {
    let mut latest: BTreeMap<AttributePath, StoredTripleValue> = BTreeMap::new();
    for (_, bytes) in rows {
        let stored = StoredTripleValue::decode(&bytes)?;
        match latest.get(&stored.attribute) {
            Some(existing) if existing.timestamp >= stored.timestamp => {}
            _ => {
                latest.insert(stored.attribute.clone(), stored);
            }
        }
    }
    latest.retain(|_, v| !v.expired);
    Ok(latest)
}

/// Pull the external-id segment (the first string segment after the fixed
/// `ave` prefix + field path) back out of an encoded key. Segment
/// boundaries are unambiguous by construction (see `tridb_kv::Key`), so
/// this is a plain structural re-parse, not a heuristic.
fn decode_external_id_segment(key: &Key, segments_before: usize) -> Result<String> {
    use tridb_errors::{TdbError, TdbErrorKind};
    let bytes = key.as_bytes();
    let mut offset = 0;
    for _ in 0..segments_before {
        offset = skip_segment(bytes, offset)?;
    }
    read_str_segment(bytes, offset).map(|(s, _)| s).ok_or_else(|| {
        TdbError::new(TdbErrorKind::Internal)
            .with_op("triple_store::decode_external_id_segment")
            .with_message("malformed key: expected external id segment")
    })
}

fn skip_segment(bytes: &[u8], offset: usize) -> Result<usize> {
    use tridb_errors::{TdbError, TdbErrorKind};
    let malformed = || {
        TdbError::new(TdbErrorKind::Internal)
            .with_op("triple_store::skip_segment")
            .with_message("malformed key: truncated segment")
    };
    let tag = *bytes.get(offset).ok_or_else(malformed)?;
    match tag {
        0 => {
            let len_bytes: [u8; 4] = bytes
                .get(offset + 1..offset + 5)
                .ok_or_else(malformed)?
                .try_into()
                .map_err(|_| malformed())?;
            let len = u32::from_be_bytes(len_bytes) as usize;
            Ok(offset + 5 + len)
        }
        1 => Ok(offset + 9),
        _ => Err(malformed()),
    }
}

fn read_str_segment(bytes: &[u8], offset: usize) -> Option<(String, usize)> {
    if bytes.get(offset)? != &0u8 {
        return None;
    }
    let len_bytes: [u8; 4] = bytes.get(offset + 1..offset + 5)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let start = offset + 5;
    let end = start + len;
    let s = std::str::from_utf8(bytes.get(start..end)?).ok()?.to_string();
    Some((s, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::path::AttributePath;
    use serde_json::json;
    use tridb_clock::ClientId;
    use tridb_kv::{KvStore, MemoryKv};

    fn ts(tick: u64) -> HybridTimestamp {
        HybridTimestamp::new(tick, ClientId::new("c1"))
    }

    #[test]
    fn write_then_read_current_value() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let entity = EntityId::new("users", "1").unwrap();
            let path = AttributePath::for_field("users", &["name".to_string()]);
            let triple = Triple::new(entity.clone(), path.clone(), json!("alice"), ts(1));
            TripleStore::write(tx, &[triple])?;
            let (value, _) = TripleStore::current_value(tx, &entity, &path)?.unwrap();
            assert_eq!(value, json!("alice"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn later_write_shadows_earlier_one() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let entity = EntityId::new("users", "1").unwrap();
            let path = AttributePath::for_field("users", &["name".to_string()]);
            TripleStore::write(tx, &[Triple::new(entity.clone(), path.clone(), json!("alice"), ts(1))])?;
            TripleStore::write(tx, &[Triple::new(entity.clone(), path.clone(), json!("bob"), ts(2))])?;
            let (value, _) = TripleStore::current_value(tx, &entity, &path)?.unwrap();
            assert_eq!(value, json!("bob"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn tombstoned_entity_has_no_current_triples() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let entity = EntityId::new("users", "1").unwrap();
            let path = AttributePath::for_field("users", &["name".to_string()]);
            TripleStore::write(tx, &[Triple::new(entity.clone(), path.clone(), json!("alice"), ts(1))])?;
            TripleStore::tombstone_entity(tx, &entity, &ts(2))?;
            let current = TripleStore::entity_current_triples(tx, &entity)?;
            assert!(current.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn scan_attribute_finds_all_entities_with_that_path() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let path = AttributePath::for_field("users", &["name".to_string()]);
            let e1 = EntityId::new("users", "1").unwrap();
            let e2 = EntityId::new("users", "2").unwrap();
            TripleStore::write(tx, &[Triple::new(e1.clone(), path.clone(), json!("alice"), ts(1))])?;
            TripleStore::write(tx, &[Triple::new(e2.clone(), path.clone(), json!("bob"), ts(2))])?;
            let rows = TripleStore::scan_attribute(tx, "users", &["name".to_string()])?;
            assert_eq!(rows.len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn scan_set_members_groups_by_entity_without_cross_member_shadowing() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let e1 = EntityId::new("users", "1").unwrap();
            let path_a = AttributePath::for_set_member("users", &["tags".to_string()], &json!("admin"));
            let path_b = AttributePath::for_set_member("users", &["tags".to_string()], &json!("beta"));
            TripleStore::write(tx, &[Triple::new(e1.clone(), path_a, json!(true), ts(1))])?;
            TripleStore::write(tx, &[Triple::new(e1.clone(), path_b, json!(true), ts(2))])?;
            let rows = TripleStore::scan_set_members(tx, "users", &["tags".to_string()])?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].1.len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn scan_attribute_excludes_tombstoned_entities() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let path = AttributePath::for_field("users", &["name".to_string()]);
            let e1 = EntityId::new("users", "1").unwrap();
            TripleStore::write(tx, &[Triple::new(e1.clone(), path.clone(), json!("alice"), ts(1))])?;
            TripleStore::tombstone_entity(tx, &e1, &ts(2))?;
            let rows = TripleStore::scan_attribute(tx, "users", &["name".to_string()])?;
            assert!(rows.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
