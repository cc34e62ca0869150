//! Backwards-incompatible edit classification (B1-B8).

use crate::model::{AttributeChanges, AttributeEditKind, SchemaDiff};
use serde_json::Value;

/// Filter `diffs` down to the ones that are backwards-incompatible.
pub fn get_backwards_incompatible_edits(diffs: &[SchemaDiff]) -> Vec<&SchemaDiff> {
    diffs.iter().filter(|d| is_backwards_incompatible(d)).collect()
}

pub fn is_backwards_incompatible(diff: &SchemaDiff) -> bool {
    match diff {
        SchemaDiff::CollectionAttribute { kind: AttributeEditKind::Delete, metadata: Some(old), attribute, .. } => {
            // B7: a field nested inside a `Record` (path longer than one
            // segment) has no optionality carve-out on removal, unlike a
            // top-level collection attribute under B1.
            if attribute.len() > 1 {
                true
            } else {
                !descriptor_is_optional(old)
            }
        }
        SchemaDiff::CollectionAttribute { kind: AttributeEditKind::Insert, metadata: Some(new), .. } => {
            !descriptor_is_optional(new)
        }
        SchemaDiff::CollectionAttribute { kind: AttributeEditKind::Update, changes: Some(changes), .. } => {
            changes_are_incompatible(changes)
        }
        _ => false,
    }
}

/// B3–B8: whether a structural `changes` object describes an unsafe edit.
/// Recurses into `record_fields` (B7) and `set_item` (B8) so nested changes
/// inside a `Set`'s item type are caught too.
fn changes_are_incompatible(changes: &AttributeChanges) -> bool {
    if changes.r#type.is_some() {
        return true; // B3
    }
    if let Some((was_optional, is_optional)) = changes.optional {
        if was_optional && !is_optional {
            return true; // B4
        }
    }
    if let Some((was_nullable, is_nullable)) = changes.options_nullable {
        if was_nullable && !is_nullable {
            return true; // B5
        }
    }
    if let Some((old_enum, new_enum)) = &changes.options_enum {
        match (old_enum, new_enum) {
            (Some(old_values), Some(new_values)) => {
                if !is_enum_superset(new_values, old_values) {
                    return true; // B6: narrowed
                }
            }
            (None, Some(_)) => return true, // B6: introduced where none existed
            (Some(_), None) | (None, None) => {}
        }
    }
    for field in &changes.record_fields {
        match field.kind {
            AttributeEditKind::Delete => return true, // B7: field removal
            AttributeEditKind::Insert => {
                let optional = field.metadata.as_ref().map(descriptor_is_optional).unwrap_or(false);
                if !optional {
                    return true; // B7: non-optional field addition
                }
            }
            AttributeEditKind::Update => {
                if let Some(inner) = &field.changes {
                    if changes_are_incompatible(inner) {
                        return true; // B7: field type change (or deeper)
                    }
                }
            }
        }
    }
    if let Some(set_item) = &changes.set_item {
        if changes_are_incompatible(set_item) {
            return true; // B8: item type change or nullability tightening
        }
    }
    false
}

fn is_enum_superset(candidate_superset: &[Value], subset: &[Value]) -> bool {
    subset.iter().all(|value| candidate_superset.contains(value))
}

fn descriptor_is_optional(metadata: &Value) -> bool {
    metadata.get("type").and_then(Value::as_str) == Some("optional")
}
