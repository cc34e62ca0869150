//! Fluent builder API for assembling a [`Schema`] from code instead of
//! hand-writing `CollectionDef`/`AttributeDescriptor` values.

use crate::descriptor::AttributeDescriptor;
use crate::model::{AttributeMap, CollectionDef, OpaqueMatcher, RoleDef, Schema};
use std::collections::BTreeMap;

/// Fluent builder for one collection's attribute map, rules, and
/// permissions.
pub struct CollectionBuilder {
    schema: AttributeMap,
    rules: Option<OpaqueMatcher>,
    permissions: Option<OpaqueMatcher>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self {
            schema: AttributeMap::new(),
            rules: None,
            permissions: None,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.schema.insert(name.into(), descriptor);
        self
    }

    pub fn rules(mut self, rules: OpaqueMatcher) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn permissions(mut self, permissions: OpaqueMatcher) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn build(self) -> CollectionDef {
        let mut def = CollectionDef::new(self.schema);
        def.rules = self.rules;
        def.permissions = self.permissions;
        def
    }
}

impl Default for CollectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for a whole [`Schema`].
///
/// ```
/// use tridb_schema::{AttributeDescriptor, SchemaBuilder, CollectionBuilder};
///
/// let schema = SchemaBuilder::new(1)
///     .collection("users", CollectionBuilder::new()
///         .attribute("id", AttributeDescriptor::id())
///         .attribute("name", AttributeDescriptor::string()))
///     .build();
///
/// assert!(schema.collection("users").is_some());
/// ```
pub struct SchemaBuilder {
    version: u32,
    collections: BTreeMap<String, CollectionDef>,
    roles: BTreeMap<String, RoleDef>,
}

impl SchemaBuilder {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            collections: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }

    pub fn collection(mut self, name: impl Into<String>, builder: CollectionBuilder) -> Self {
        self.collections.insert(name.into(), builder.build());
        self
    }

    pub fn role(mut self, name: impl Into<String>, match_: OpaqueMatcher) -> Self {
        self.roles.insert(name.into(), RoleDef { match_ });
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            version: self.version,
            collections: self.collections,
            roles: self.roles,
        }
    }
}
