//! Data-safety checker: consults the live database to
//! decide whether a backwards-incompatible edit would actually violate
//! existing data.

use crate::classify::get_backwards_incompatible_edits;
use crate::model::{AttributeChanges, AttributeEditKind, SchemaDiff};
use serde_json::Value;
use std::collections::BTreeSet;
use tridb_errors::Result;
use tridb_kv::KvTransaction;
use tridb_triples::TripleStore;

/// One backwards-incompatible edit, evaluated against the live database.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiffIssue {
    pub diff: SchemaDiff,
    pub violates_existing_data: bool,
    pub reason: Option<String>,
}

/// `getSchemaDiffIssues`: filter `diffs` to the backwards-incompatible ones
/// and evaluate each against `tx`.
pub fn get_schema_diff_issues(tx: &mut dyn KvTransaction, diffs: &[SchemaDiff]) -> Result<Vec<SchemaDiffIssue>> {
    let mut out = Vec::new();
    for diff in get_backwards_incompatible_edits(diffs) {
        let (violates_existing_data, reason) = evaluate(tx, diff)?;
        out.push(SchemaDiffIssue {
            diff: diff.clone(),
            violates_existing_data,
            reason,
        });
    }
    Ok(out)
}

fn evaluate(tx: &mut dyn KvTransaction, diff: &SchemaDiff) -> Result<(bool, Option<String>)> {
    match diff {
        SchemaDiff::CollectionAttribute { collection, kind: AttributeEditKind::Delete, attribute, .. } => {
            let rows = TripleStore::scan_attribute(tx, collection, attribute)?;
            let violates = rows.iter().any(|(_, value, _)| !value.is_null());
            Ok((
                violates,
                violates.then(|| format!("{collection} has entities with a live value at {attribute:?}")),
            ))
        }
        SchemaDiff::CollectionAttribute { collection, kind: AttributeEditKind::Insert, attribute, .. } => {
            let violates = any_entity_missing_value(tx, collection, attribute)?;
            Ok((
                violates,
                violates.then(|| format!("{collection} has entities with no value at the new path {attribute:?}")),
            ))
        }
        SchemaDiff::CollectionAttribute {
            collection,
            kind: AttributeEditKind::Update,
            attribute,
            changes: Some(changes),
            ..
        } => evaluate_update(tx, collection, attribute, changes),
        _ => Ok((false, None)),
    }
}

fn evaluate_update(
    tx: &mut dyn KvTransaction,
    collection: &str,
    path: &[String],
    changes: &AttributeChanges,
) -> Result<(bool, Option<String>)> {
    if let Some((_, new_tag)) = &changes.r#type {
        let rows = TripleStore::scan_attribute(tx, collection, path)?;
        let violates = rows.iter().any(|(_, value, _)| !value.is_null() && !value_matches_tag(value, new_tag));
        return Ok((
            violates,
            violates.then(|| format!("{collection} has a value at {path:?} that is not a {new_tag}")),
        ));
    }

    if let Some((was_optional, is_optional)) = changes.optional {
        if was_optional && !is_optional {
            let violates = any_entity_missing_value(tx, collection, path)?;
            return Ok((
                violates,
                violates.then(|| format!("{collection} has entities missing a value at {path:?}")),
            ));
        }
    }

    if let Some((was_nullable, is_nullable)) = changes.options_nullable {
        if was_nullable && !is_nullable {
            let rows = TripleStore::scan_attribute(tx, collection, path)?;
            let violates = rows.iter().any(|(_, value, _)| value.is_null());
            return Ok((
                violates,
                violates.then(|| format!("{collection} has an explicit null at {path:?}")),
            ));
        }
    }

    if let Some((_, Some(new_enum))) = &changes.options_enum {
        let rows = TripleStore::scan_attribute(tx, collection, path)?;
        let violates = rows.iter().any(|(_, value, _)| !value.is_null() && !new_enum.contains(value));
        return Ok((
            violates,
            violates.then(|| format!("{collection} has a value at {path:?} outside the new enum")),
        ));
    }

    if changes.set_item.is_some() || !changes.record_fields.is_empty() {
        let rows = TripleStore::scan_set_members(tx, collection, path)?;
        let violates = rows.iter().any(|(_, members)| !members.is_empty());
        return Ok((
            violates,
            violates.then(|| format!("{collection} has existing set members at {path:?}")),
        ));
    }

    Ok((false, None))
}

fn any_entity_missing_value(tx: &mut dyn KvTransaction, collection: &str, path: &[String]) -> Result<bool> {
    let all_ids: BTreeSet<String> = TripleStore::collection_entity_ids(tx, collection)?.into_iter().collect();
    if all_ids.is_empty() {
        return Ok(false);
    }
    let with_value: BTreeSet<String> = TripleStore::scan_attribute(tx, collection, path)?
        .into_iter()
        .map(|(entity, _, _)| entity.external_id().to_string())
        .collect();
    Ok(!all_ids.is_subset(&with_value))
}

fn value_matches_tag(value: &Value, tag: &str) -> bool {
    match tag {
        "string" | "id" | "date" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "record" => value.is_object(),
        "set" => value.is_array(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tridb_clock::{ClientId, HybridTimestamp};
    use tridb_kv::{KvStore, MemoryKv};
    use tridb_triples::{AttributePath, EntityId, Triple};

    fn ts(tick: u64) -> HybridTimestamp {
        HybridTimestamp::new(tick, ClientId::new("c1"))
    }

    fn delete_diff(collection: &str, path: &[&str]) -> SchemaDiff {
        SchemaDiff::CollectionAttribute {
            collection: collection.to_string(),
            kind: AttributeEditKind::Delete,
            attribute: path.iter().map(|s| s.to_string()).collect(),
            metadata: Some(json!({ "type": "string", "options": { "nullable": false } })),
            changes: None,
            is_new_collection: false,
        }
    }

    #[test]
    fn delete_of_populated_attribute_violates_existing_data() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let entity = EntityId::new("users", "1").unwrap();
            let path = AttributePath::for_field("users", &["email".to_string()]);
            TripleStore::write(tx, &[Triple::new(entity, path, json!("a@example.com"), ts(1))])?;

            let diffs = vec![delete_diff("users", &["email"])];
            let issues = get_schema_diff_issues(tx, &diffs)?;
            assert_eq!(issues.len(), 1);
            assert!(issues[0].violates_existing_data);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_against_empty_collection_does_not_violate() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let diffs = vec![delete_diff("users", &["email"])];
            let issues = get_schema_diff_issues(tx, &diffs)?;
            assert_eq!(issues.len(), 1);
            assert!(!issues[0].violates_existing_data);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn non_incompatible_diffs_produce_no_issues() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let diffs = vec![SchemaDiff::CollectionRules { collection: "users".to_string() }];
            let issues = get_schema_diff_issues(tx, &diffs)?;
            assert!(issues.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn insert_of_required_attribute_violates_when_entities_exist() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let entity = EntityId::new("users", "1").unwrap();
            let name_path = AttributePath::for_field("users", &["name".to_string()]);
            TripleStore::write(tx, &[Triple::new(entity, name_path, json!("alice"), ts(1))])?;

            let diffs = vec![SchemaDiff::CollectionAttribute {
                collection: "users".to_string(),
                kind: AttributeEditKind::Insert,
                attribute: vec!["age".to_string()],
                metadata: Some(json!({ "type": "number", "options": { "nullable": false } })),
                changes: None,
                is_new_collection: false,
            }];
            let issues = get_schema_diff_issues(tx, &diffs)?;
            assert_eq!(issues.len(), 1);
            assert!(issues[0].violates_existing_data);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn enum_narrowing_violates_only_when_out_of_range_value_present() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            let entity = EntityId::new("users", "1").unwrap();
            let path = AttributePath::for_field("users", &["status".to_string()]);
            TripleStore::write(tx, &[Triple::new(entity, path, json!("archived"), ts(1))])?;

            let mut changes = AttributeChanges::default();
            changes.options_enum = Some((
                Some(vec![json!("active"), json!("archived")]),
                Some(vec![json!("active")]),
            ));
            let diffs = vec![SchemaDiff::CollectionAttribute {
                collection: "users".to_string(),
                kind: AttributeEditKind::Update,
                attribute: vec!["status".to_string()],
                metadata: None,
                changes: Some(changes),
                is_new_collection: false,
            }];
            let issues = get_schema_diff_issues(tx, &diffs)?;
            assert_eq!(issues.len(), 1);
            assert!(issues[0].violates_existing_data);
            Ok(())
        })
        .unwrap();
    }
}
