//! Schema diff engine (C8): `diff_schemas` walks two schemas attribute by
//! attribute and produces a deterministic, structured diff list.
//!
//! Traversal: collection maps are walked key by key; `Record` fields
//! recurse so each leaf attribute (scalar or `Set`) gets its own
//! `insert`/`delete`/`update` diff at its full path. A `Set`'s item
//! descriptor is compared structurally but never produces its own diff
//! entry — any difference inside it folds into a single `update` at the
//! set's own path.

use crate::model::{AttributeChanges, AttributeEditKind, RecordFieldChange, SchemaDiff};
use std::collections::BTreeSet;
use tridb_schema::{AttributeDescriptor, AttributeMap, AttributeOptions, Schema};

pub fn diff_schemas(old: &Schema, new: &Schema) -> Vec<SchemaDiff> {
    let mut out = Vec::new();
    let collections: BTreeSet<&String> = old.collections.keys().chain(new.collections.keys()).collect();

    for name in collections {
        let old_def = old.collections.get(name);
        let new_def = new.collections.get(name);

        match (old_def, new_def) {
            (None, Some(new_def)) => {
                diff_attribute_map(name, &AttributeMap::new(), &new_def.schema, true, &mut out);
            }
            (Some(old_def), None) => {
                diff_attribute_map(name, &old_def.schema, &AttributeMap::new(), false, &mut out);
            }
            (Some(old_def), Some(new_def)) => {
                diff_attribute_map(name, &old_def.schema, &new_def.schema, false, &mut out);
                if old_def.rules != new_def.rules {
                    out.push(SchemaDiff::CollectionRules { collection: name.clone() });
                }
                if old_def.permissions != new_def.permissions {
                    out.push(SchemaDiff::CollectionPermissions { collection: name.clone() });
                }
            }
            (None, None) => unreachable!(),
        }
    }

    if old.roles != new.roles {
        out.push(SchemaDiff::Roles);
    }

    crate::model::sort_diffs(&mut out);
    out
}

fn diff_attribute_map(
    collection: &str,
    old: &AttributeMap,
    new: &AttributeMap,
    is_new_collection: bool,
    out: &mut Vec<SchemaDiff>,
) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let path = vec![key.clone()];
        match (old.get(key), new.get(key)) {
            (None, Some(descriptor)) => emit_inserts(collection, &path, descriptor, is_new_collection, out),
            (Some(descriptor), None) => emit_deletes(collection, &path, descriptor, out),
            (Some(old_descr), Some(new_descr)) => {
                diff_descriptor_at_path(collection, &path, old_descr, new_descr, is_new_collection, out)
            }
            (None, None) => unreachable!(),
        }
    }
}

fn emit_inserts(
    collection: &str,
    path: &[String],
    descriptor: &AttributeDescriptor,
    is_new_collection: bool,
    out: &mut Vec<SchemaDiff>,
) {
    if let AttributeDescriptor::Record { fields } = descriptor.unwrap_optional() {
        for (key, field) in fields {
            let mut child = path.to_vec();
            child.push(key.clone());
            emit_inserts(collection, &child, field, is_new_collection, out);
        }
        return;
    }
    out.push(SchemaDiff::CollectionAttribute {
        collection: collection.to_string(),
        kind: AttributeEditKind::Insert,
        attribute: path.to_vec(),
        metadata: Some(serde_json::to_value(descriptor).expect("descriptor always serializes")),
        changes: None,
        is_new_collection,
    });
}

fn emit_deletes(collection: &str, path: &[String], descriptor: &AttributeDescriptor, out: &mut Vec<SchemaDiff>) {
    if let AttributeDescriptor::Record { fields } = descriptor.unwrap_optional() {
        for (key, field) in fields {
            let mut child = path.to_vec();
            child.push(key.clone());
            emit_deletes(collection, &child, field, out);
        }
        return;
    }
    out.push(SchemaDiff::CollectionAttribute {
        collection: collection.to_string(),
        kind: AttributeEditKind::Delete,
        attribute: path.to_vec(),
        metadata: Some(serde_json::to_value(descriptor).expect("descriptor always serializes")),
        changes: None,
        is_new_collection: false,
    });
}

fn diff_descriptor_at_path(
    collection: &str,
    path: &[String],
    old: &AttributeDescriptor,
    new: &AttributeDescriptor,
    is_new_collection: bool,
    out: &mut Vec<SchemaDiff>,
) {
    let old_tag = old.type_tag();
    let new_tag = new.type_tag();

    if old_tag == "record" && new_tag == "record" {
        let mut changes = AttributeChanges::default();
        if old.is_optional() != new.is_optional() {
            changes.optional = Some((old.is_optional(), new.is_optional()));
        }
        if !changes.is_empty() {
            out.push(SchemaDiff::CollectionAttribute {
                collection: collection.to_string(),
                kind: AttributeEditKind::Update,
                attribute: path.to_vec(),
                metadata: None,
                changes: Some(changes),
                is_new_collection,
            });
        }
        let old_fields = old.unwrap_optional().record_fields().expect("checked record above");
        let new_fields = new.unwrap_optional().record_fields().expect("checked record above");
        diff_attribute_map(collection, old_fields, new_fields, false, out);
        return;
    }

    let mut changes = AttributeChanges::default();
    if old_tag != new_tag {
        changes.r#type = Some((old_tag.to_string(), new_tag.to_string()));
    }
    if old.is_optional() != new.is_optional() {
        changes.optional = Some((old.is_optional(), new.is_optional()));
    }
    diff_options(old.options(), new.options(), &mut changes);

    if old_tag == "set" && new_tag == "set" {
        if let (Some(old_item), Some(new_item)) = (old.set_item(), new.set_item()) {
            if let Some(item_changes) = diff_set_item(old_item, new_item) {
                changes.set_item = Some(Box::new(item_changes));
            }
        }
    }

    if !changes.is_empty() {
        out.push(SchemaDiff::CollectionAttribute {
            collection: collection.to_string(),
            kind: AttributeEditKind::Update,
            attribute: path.to_vec(),
            metadata: None,
            changes: Some(changes),
            is_new_collection,
        });
    }
}

/// Structural diff of a `Set`'s item descriptor, used only to populate
/// `changes.set_item` — never emitted as its own diff record.
fn diff_set_item(old: &AttributeDescriptor, new: &AttributeDescriptor) -> Option<AttributeChanges> {
    let mut changes = AttributeChanges::default();
    let old_tag = old.type_tag();
    let new_tag = new.type_tag();
    if old_tag != new_tag {
        changes.r#type = Some((old_tag.to_string(), new_tag.to_string()));
    }
    if old.is_optional() != new.is_optional() {
        changes.optional = Some((old.is_optional(), new.is_optional()));
    }
    diff_options(old.options(), new.options(), &mut changes);

    if old_tag == "record" && new_tag == "record" {
        let old_fields = old.unwrap_optional().record_fields().unwrap();
        let new_fields = new.unwrap_optional().record_fields().unwrap();
        let keys: BTreeSet<&String> = old_fields.keys().chain(new_fields.keys()).collect();
        for key in keys {
            let field_change = match (old_fields.get(key), new_fields.get(key)) {
                (None, Some(descr)) => Some(RecordFieldChange {
                    field: key.clone(),
                    kind: AttributeEditKind::Insert,
                    metadata: Some(serde_json::to_value(descr).expect("descriptor always serializes")),
                    changes: None,
                }),
                (Some(descr), None) => Some(RecordFieldChange {
                    field: key.clone(),
                    kind: AttributeEditKind::Delete,
                    metadata: Some(serde_json::to_value(descr).expect("descriptor always serializes")),
                    changes: None,
                }),
                (Some(o), Some(n)) => diff_set_item(o, n).map(|c| RecordFieldChange {
                    field: key.clone(),
                    kind: AttributeEditKind::Update,
                    metadata: None,
                    changes: Some(Box::new(c)),
                }),
                (None, None) => unreachable!(),
            };
            if let Some(change) = field_change {
                changes.record_fields.push(change);
            }
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(changes)
    }
}

fn diff_options(old: Option<&AttributeOptions>, new: Option<&AttributeOptions>, changes: &mut AttributeChanges) {
    let (old, new) = match (old, new) {
        (Some(o), Some(n)) => (o, n),
        _ => return,
    };
    if old.nullable != new.nullable {
        changes.options_nullable = Some((old.nullable, new.nullable));
    }
    let old_default = old.default.as_ref().map(|d| serde_json::to_value(d).unwrap());
    let new_default = new.default.as_ref().map(|d| serde_json::to_value(d).unwrap());
    if old_default != new_default {
        changes.options_default = Some((old_default, new_default));
    }
    if old.enum_values != new.enum_values {
        changes.options_enum = Some((old.enum_values.clone(), new.enum_values.clone()));
    }
}
