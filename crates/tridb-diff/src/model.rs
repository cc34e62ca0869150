//! Diff record shapes (C8).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeEditKind {
    Insert,
    Delete,
    Update,
}

/// Structural description of what changed between two descriptors at the
/// same path, in an `update` diff record. Only the fields that actually
/// differ are `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<(bool, bool)>,
    #[serde(rename = "options.nullable", skip_serializing_if = "Option::is_none")]
    pub options_nullable: Option<(bool, bool)>,
    #[serde(rename = "options.default", skip_serializing_if = "Option::is_none")]
    pub options_default: Option<(Option<Value>, Option<Value>)>,
    #[serde(rename = "options.enum", skip_serializing_if = "Option::is_none")]
    pub options_enum: Option<(Option<Vec<Value>>, Option<Vec<Value>>)>,
    /// Field-level changes inside a `Record`, keyed by field name.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub record_fields: Vec<RecordFieldChange>,
    /// Whether the `Set` item descriptor itself changed (nested diff).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_item: Option<Box<AttributeChanges>>,
}

impl AttributeChanges {
    pub fn is_empty(&self) -> bool {
        self == &AttributeChanges::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFieldChange {
    pub field: String,
    pub kind: AttributeEditKind,
    /// The inserted/deleted descriptor, for `Insert`/`Delete` kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Box<AttributeChanges>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaDiff {
    CollectionAttribute {
        collection: String,
        kind: AttributeEditKind,
        attribute: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        changes: Option<AttributeChanges>,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        is_new_collection: bool,
    },
    CollectionRules {
        collection: String,
    },
    CollectionPermissions {
        collection: String,
    },
    Roles,
}

impl SchemaDiff {
    /// Sort key: `(collection, attribute path, discriminant rank)`, per
    /// the determinism requirement on round-tripped diffs.
    fn sort_key(&self) -> (String, Vec<String>, u8) {
        match self {
            SchemaDiff::CollectionAttribute { collection, attribute, .. } => {
                (collection.clone(), attribute.clone(), 0)
            }
            SchemaDiff::CollectionRules { collection } => (collection.clone(), vec![], 1),
            SchemaDiff::CollectionPermissions { collection } => (collection.clone(), vec![], 2),
            SchemaDiff::Roles => (String::new(), vec![], 3),
        }
    }

    pub fn collection(&self) -> Option<&str> {
        match self {
            SchemaDiff::CollectionAttribute { collection, .. }
            | SchemaDiff::CollectionRules { collection }
            | SchemaDiff::CollectionPermissions { collection } => Some(collection),
            SchemaDiff::Roles => None,
        }
    }
}

/// Sort diffs deterministically in place.
pub fn sort_diffs(diffs: &mut [SchemaDiff]) {
    diffs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
