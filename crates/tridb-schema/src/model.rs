//! Schema, collection, and role definitions.

use crate::descriptor::AttributeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute name -> descriptor, for one collection.
pub type AttributeMap = BTreeMap<String, AttributeDescriptor>;

/// Opaque matcher blob, compared only by deep (structural) equality. Rules,
/// permissions, and roles all use this shape — the schema-diff engine never
/// interprets their contents, only detects that they changed.
pub type OpaqueMatcher = serde_json::Value;

/// One collection's schema, write rules, and permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CollectionDef {
    pub schema: AttributeMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<OpaqueMatcher>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<OpaqueMatcher>,
}

impl CollectionDef {
    pub fn new(schema: AttributeMap) -> Self {
        Self {
            schema,
            rules: None,
            permissions: None,
        }
    }

    pub fn with_rules(mut self, rules: OpaqueMatcher) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_permissions(mut self, permissions: OpaqueMatcher) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

/// A role's opaque match predicate, used only for deep-equality diffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDef {
    #[serde(rename = "match")]
    pub match_: OpaqueMatcher,
}

/// The full schema: version, collections, and (optional) roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    pub version: u32,
    pub collections: BTreeMap<String, CollectionDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, RoleDef>,
}

impl Schema {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            collections: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.get(name)
    }

    /// Look up the descriptor at a path within a collection, walking through
    /// `Record` fields. The path's first element names the attribute, not
    /// the collection (the collection is already selected).
    pub fn attribute_at<'a>(
        &'a self,
        collection: &str,
        path: &[String],
    ) -> Option<&'a AttributeDescriptor> {
        let collection_def = self.collections.get(collection)?;
        let (head, rest) = path.split_first()?;
        let mut current = collection_def.schema.get(head)?;
        for segment in rest {
            current = current.record_fields()?.get(segment)?;
        }
        Some(current)
    }
}
