//! Change-tracking write proxy (C6).
//!
//! `EntityStage` wraps a fetched document without mutating it: assignments
//! and set operations are recorded into a staging map, keyed by
//! collection-relative field path, and only become triples at `commit`.
//! Schema validation (unknown attributes, `Set`-path direct assignment) and
//! the write-rule re-check both run against the staged state before commit.

use crate::codec::encode_value;
use crate::entity::EntityId;
use crate::filter::{evaluate_all, Predicate, Variables};
use crate::path::AttributePath;
use crate::triple::Triple;
use crate::value::Value;
use serde_json::Map;
use std::collections::BTreeMap;
use tridb_clock::HybridTimestamp;
use tridb_errors::{Result, TdbError, TdbErrorKind};
use tridb_schema::{AttributeDescriptor, CollectionDef};

#[derive(Debug, Clone)]
enum Staged {
    Scalar(Value),
    SetMember { member: Value, present: bool },
}

/// A staged mutation session over one fetched (or newly-inserted) entity.
pub struct EntityStage {
    collection: String,
    entity: EntityId,
    base: Map<String, Value>,
    staged: BTreeMap<Vec<String>, Staged>,
}

impl EntityStage {
    /// `base` is the entity's current plain document (empty for a fresh
    /// insert).
    pub fn new(collection: impl Into<String>, entity: EntityId, base: Map<String, Value>) -> Self {
        Self {
            collection: collection.into(),
            entity,
            base,
            staged: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    /// Stage a scalar (or whole-subtree) assignment at `path`. Rejects
    /// paths the schema doesn't know about, and paths the schema marks as
    /// `Set` (those must go through [`Self::set_add`]/[`Self::set_remove`]).
    pub fn set(&mut self, schema: Option<&CollectionDef>, path: &[String], value: Value) -> Result<()> {
        self.check_known_attribute(schema, path)?;
        if let Some(def) = schema {
            if let Some(descriptor) = def.schema.get(path[0].as_str()).and_then(|d| descend(d, &path[1..])) {
                if matches!(descriptor.unwrap_optional(), AttributeDescriptor::Set { .. }) {
                    return Err(TdbError::new(TdbErrorKind::UnknownAttribute)
                        .with_op("entity_stage::set")
                        .with_message(format!(
                            "path '{}' is a Set; use add/remove, not direct assignment",
                            path.join(".")
                        )));
                }
            }
        }
        self.staged.insert(path.to_vec(), Staged::Scalar(value));
        Ok(())
    }

    /// Read the current staged-or-base value at `path` (`None` if absent
    /// from both).
    pub fn get(&self, path: &[String]) -> Option<Value> {
        if let Some(Staged::Scalar(value)) = self.staged.get(path) {
            return Some(value.clone());
        }
        get_path(&self.base, path)
    }

    pub fn set_add(&mut self, schema: Option<&CollectionDef>, path: &[String], member: Value) -> Result<()> {
        self.check_known_attribute(schema, path)?;
        self.staged.insert(
            member_key(path, &member),
            Staged::SetMember { member, present: true },
        );
        Ok(())
    }

    pub fn set_remove(&mut self, schema: Option<&CollectionDef>, path: &[String], member: Value) -> Result<()> {
        self.check_known_attribute(schema, path)?;
        self.staged.insert(
            member_key(path, &member),
            Staged::SetMember { member, present: false },
        );
        Ok(())
    }

    /// Consult staged set operations first, then fall back to the base
    /// document's array at `path`.
    pub fn set_has(&self, path: &[String], member: &Value) -> bool {
        if let Some(Staged::SetMember { present, .. }) = self.staged.get(&member_key(path, member)) {
            return *present;
        }
        get_path(&self.base, path)
            .and_then(|v| v.as_array().map(|items| items.contains(member)))
            .unwrap_or(false)
    }

    /// The merged document (base with staged changes applied), used for
    /// the write-rule re-check.
    pub fn merged_document(&self) -> Map<String, Value> {
        let mut merged = self.base.clone();
        for (path, staged) in &self.staged {
            match staged {
                Staged::Scalar(value) => set_path(&mut merged, path, value.clone()),
                Staged::SetMember { member, present } => {
                    let array_path = &path[..path.len() - 1];
                    let mut members: Vec<Value> = get_path(&merged, array_path)
                        .and_then(|v| v.as_array().cloned())
                        .unwrap_or_default();
                    members.retain(|m| m != member);
                    if *present {
                        members.push(member.clone());
                    }
                    set_path(&mut merged, array_path, Value::Array(members));
                }
            }
        }
        merged
    }

    /// Check the merged document against the collection's write rules
    /// (an implicit AND of each rule predicate); `Err(WriteRuleViolation)`
    /// aborts the caller's transaction.
    pub fn check_write_rules(&self, def: Option<&CollectionDef>, variables: &Variables) -> Result<()> {
        let Some(rules) = def.and_then(|d| d.rules.as_ref()) else {
            return Ok(());
        };
        let write_rules = rules.get("write").cloned().unwrap_or(Value::Array(vec![]));
        let predicates: Vec<Predicate> = write_rules
            .as_array()
            .ok_or_else(|| {
                TdbError::new(TdbErrorKind::InvalidSchema)
                    .with_op("entity_stage::check_write_rules")
                    .with_message("'write' rules must be an array")
            })?
            .iter()
            .map(Predicate::parse)
            .collect::<Result<_>>()?;

        let merged = self.merged_document();
        let resolve = |path: &[String]| get_path(&merged, path);
        if !evaluate_all(&predicates, &resolve, variables)? {
            return Err(TdbError::new(TdbErrorKind::WriteRuleViolation)
                .with_op("entity_stage::check_write_rules")
                .with_entity_id(self.entity.to_string())
                .with_message("write rule rejected this mutation"));
        }
        Ok(())
    }

    /// Convert staged changes into triples at a single commit timestamp.
    pub fn commit(self, timestamp: &HybridTimestamp) -> Vec<Triple> {
        let mut out = Vec::new();
        for (path, staged) in &self.staged {
            match staged {
                Staged::Scalar(value) => {
                    let mut field_path = path.clone();
                    encode_value(&self.collection, &self.entity, &mut field_path, value, timestamp, &mut out);
                }
                Staged::SetMember { member, present } => {
                    let field_path = &path[..path.len() - 1];
                    let attribute = AttributePath::for_set_member(&self.collection, field_path, member);
                    out.push(Triple::new(self.entity.clone(), attribute, Value::Bool(*present), timestamp.clone()));
                }
            }
        }
        out
    }

    fn check_known_attribute(&self, schema: Option<&CollectionDef>, path: &[String]) -> Result<()> {
        let Some(def) = schema else {
            return Ok(());
        };
        let Some(head) = path.first() else {
            return Ok(());
        };
        let Some(top) = def.schema.get(head) else {
            return Err(unknown_attribute(&self.entity, path));
        };
        if descend(top, &path[1..]).is_none() {
            return Err(unknown_attribute(&self.entity, path));
        }
        Ok(())
    }
}

fn unknown_attribute(entity: &EntityId, path: &[String]) -> TdbError {
    TdbError::new(TdbErrorKind::UnknownAttribute)
        .with_op("entity_stage")
        .with_entity_id(entity.to_string())
        .with_message(format!("unknown attribute path '{}'", path.join(".")))
}

fn descend<'a>(descriptor: &'a AttributeDescriptor, rest: &[String]) -> Option<&'a AttributeDescriptor> {
    let mut current = descriptor;
    for segment in rest {
        current = current.record_fields()?.get(segment)?;
    }
    Some(current)
}

/// A set-staging key is the field path with the member's canonical JSON
/// text appended, so repeated ops on the same member collapse to the last
/// write (matching the timestamp-ordered CRDT semantics at commit).
fn member_key(path: &[String], member: &Value) -> Vec<String> {
    let mut key = path.to_vec();
    key.push(serde_json::to_string(member).expect("JSON value serialization never fails"));
    key
}

fn get_path(doc: &Map<String, Value>, path: &[String]) -> Option<Value> {
    let (head, rest) = path.split_first()?;
    let mut current = doc.get(head)?;
    for segment in rest {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn set_path(doc: &mut Map<String, Value>, path: &[String], value: Value) {
    if path.is_empty() {
        return;
    }
    if path.len() == 1 {
        doc.insert(path[0].clone(), value);
        return;
    }
    let entry = doc
        .entry(path[0].clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(nested) = entry {
        set_path(nested, &path[1..], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tridb_clock::ClientId;
    use tridb_schema::{AttributeDescriptor, CollectionBuilder};

    fn ts() -> HybridTimestamp {
        HybridTimestamp::new(1, ClientId::new("c1"))
    }

    fn users_def() -> CollectionDef {
        CollectionBuilder::new()
            .attribute("id", AttributeDescriptor::id())
            .attribute("name", AttributeDescriptor::string())
            .attribute("tags", AttributeDescriptor::set(AttributeDescriptor::string()))
            .build()
    }

    #[test]
    fn set_stages_and_reads_back_before_commit() {
        let entity = EntityId::new("users", "1").unwrap();
        let mut stage = EntityStage::new("users", entity, Map::new());
        stage.set(None, &["name".to_string()], json!("alice")).unwrap();
        assert_eq!(stage.get(&["name".to_string()]), Some(json!("alice")));
    }

    #[test]
    fn assigning_unknown_attribute_fails_with_schema() {
        let def = users_def();
        let entity = EntityId::new("users", "1").unwrap();
        let mut stage = EntityStage::new("users", entity, Map::new());
        let err = stage.set(Some(&def), &["nickname".to_string()], json!("a")).unwrap_err();
        assert_eq!(err.kind(), TdbErrorKind::UnknownAttribute);
    }

    #[test]
    fn direct_assignment_to_set_path_rejected() {
        let def = users_def();
        let entity = EntityId::new("users", "1").unwrap();
        let mut stage = EntityStage::new("users", entity, Map::new());
        let err = stage
            .set(Some(&def), &["tags".to_string()], json!(["x"]))
            .unwrap_err();
        assert_eq!(err.kind(), TdbErrorKind::UnknownAttribute);
    }

    #[test]
    fn add_then_remove_same_member_leaves_it_absent() {
        let entity = EntityId::new("users", "1").unwrap();
        let mut stage = EntityStage::new("users", entity, Map::new());
        stage.set_add(None, &["tags".to_string()], json!("x")).unwrap();
        stage.set_remove(None, &["tags".to_string()], json!("x")).unwrap();
        assert!(!stage.set_has(&["tags".to_string()], &json!("x")));
    }

    #[test]
    fn remove_then_add_same_member_leaves_it_present() {
        let entity = EntityId::new("users", "1").unwrap();
        let mut stage = EntityStage::new("users", entity, Map::new());
        stage.set_remove(None, &["tags".to_string()], json!("x")).unwrap();
        stage.set_add(None, &["tags".to_string()], json!("x")).unwrap();
        assert!(stage.set_has(&["tags".to_string()], &json!("x")));
    }

    #[test]
    fn commit_emits_one_triple_per_staged_change() {
        let entity = EntityId::new("users", "1").unwrap();
        let mut stage = EntityStage::new("users", entity, Map::new());
        stage.set(None, &["name".to_string()], json!("alice")).unwrap();
        stage.set_add(None, &["tags".to_string()], json!("x")).unwrap();
        let triples = stage.commit(&ts());
        assert_eq!(triples.len(), 2);
    }

    #[test]
    fn write_rule_literal_false_rejects_every_mutation() {
        let def = CollectionBuilder::new()
            .attribute("id", AttributeDescriptor::id())
            .rules(json!({ "write": [false] }))
            .build();
        let entity = EntityId::new("users", "1").unwrap();
        let stage = EntityStage::new("users", entity, Map::new());
        let err = stage
            .check_write_rules(Some(&def), &Variables::new())
            .unwrap_err();
        assert_eq!(err.kind(), TdbErrorKind::WriteRuleViolation);
    }

    #[test]
    fn no_rules_configured_always_passes() {
        let entity = EntityId::new("users", "1").unwrap();
        let stage = EntityStage::new("users", entity, Map::new());
        assert!(stage.check_write_rules(None, &Variables::new()).is_ok());
    }
}
