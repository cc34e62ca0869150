//! The single source of truth for `insert`/`update`/`fetch`/`fetchById`
//! inside one open [`tridb_kv::KvTransaction`].
//!
//! `Db`'s public operations are thin wrappers that open one transaction,
//! drive a `Tx` through it, and notify subscriptions once it commits.

use crate::mutation::Mutation;
use crate::query::Query;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tridb_clock::LogicalClock;
use tridb_errors::{Result, TdbError, TdbErrorKind};
use tridb_kv::KvTransaction;
use tridb_schema::{CollectionDef, Schema};
use tridb_triples::{decode_document, EntityId, EntityStage, TripleStore, Variables};

/// One transaction's view of the database: the schema as of transaction
/// start, and the set of collections a write touched (so the caller knows
/// who to notify after commit).
pub struct Tx<'a> {
    tx: &'a mut dyn KvTransaction,
    clock: &'a LogicalClock,
    variables: &'a Variables,
    schema: Schema,
    touched: BTreeSet<String>,
}

impl<'a> Tx<'a> {
    pub(crate) fn new(tx: &'a mut dyn KvTransaction, clock: &'a LogicalClock, variables: &'a Variables, schema: Schema) -> Self {
        Self { tx, clock, variables, schema, touched: BTreeSet::new() }
    }

    pub(crate) fn touched(&self) -> impl Iterator<Item = &str> {
        self.touched.iter().map(String::as_str)
    }

    fn collection_def(&self, collection: &str) -> Option<&CollectionDef> {
        self.schema.collection(collection)
    }

    /// Insert `doc` as a new entity, generating an external id if `id` is
    /// `None`. Returns the commit timestamp.
    pub fn insert(&mut self, collection: &str, doc: &Map<String, Value>, id: Option<String>) -> Result<tridb_clock::HybridTimestamp> {
        let external_id = id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        let entity = EntityId::new(collection, external_id)?;
        let def = self.collection_def(collection);
        let mut stage = EntityStage::new(collection, entity, Map::new());
        stage_document(&mut stage, def, doc)?;
        stage.check_write_rules(def, self.variables)?;
        let timestamp = self.clock.tick();
        let triples = stage.commit(&timestamp);
        TripleStore::write(self.tx, &triples)?;
        self.touched.insert(collection.to_string());
        Ok(timestamp)
    }

    /// Apply `mutator` to the fetched entity's staged document and commit
    /// the resulting changes. `EntityNotFound` if `id` has no live triples.
    pub fn update(&mut self, collection: &str, id: &str, mutator: impl FnOnce(&mut Mutation) -> Result<()>) -> Result<()> {
        let entity = EntityId::new(collection, id)?;
        let current = TripleStore::entity_current_triples(self.tx, &entity)?;
        if current.is_empty() {
            return Err(TdbError::new(TdbErrorKind::EntityNotFound)
                .with_op("tx::update")
                .with_entity_id(entity.to_string())
                .with_message("no live entity at this id"));
        }
        let base = decode_document(&entity, &current);
        let def = self.collection_def(collection);
        let mut stage = EntityStage::new(collection, entity, base);
        mutator(&mut Mutation::new(&mut stage, def))?;
        stage.check_write_rules(def, self.variables)?;
        let timestamp = self.clock.tick();
        let triples = stage.commit(&timestamp);
        TripleStore::write(self.tx, &triples)?;
        self.touched.insert(collection.to_string());
        Ok(())
    }

    pub fn fetch(&mut self, query: &Query) -> Result<Vec<Map<String, Value>>> {
        let ids = TripleStore::collection_entity_ids(self.tx, &query.collection)?;
        let mut out = Vec::with_capacity(ids.len());
        for external_id in ids {
            let entity = EntityId::new(&query.collection, external_id)?;
            let current = TripleStore::entity_current_triples(self.tx, &entity)?;
            let doc = decode_document(&entity, &current);
            if let Some(filter) = &query.filter {
                let resolve = |path: &[String]| get_path(&doc, path);
                if !filter.evaluate(&resolve, self.variables)? {
                    continue;
                }
            }
            out.push(doc);
        }
        Ok(out)
    }

    pub fn fetch_by_id(&mut self, collection: &str, id: &str) -> Result<Option<Map<String, Value>>> {
        let entity = EntityId::new(collection, id)?;
        let current = TripleStore::entity_current_triples(self.tx, &entity)?;
        if current.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_document(&entity, &current)))
    }
}

/// Stage each top-level field of a plain document, recursing into nested
/// objects/arrays exactly as `tridb_triples::codec::encode_value` does, but
/// routing every leaf through `EntityStage` so unknown-attribute and
/// `Set`-path validation apply uniformly to insert and update.
fn stage_document(stage: &mut EntityStage, def: Option<&CollectionDef>, doc: &Map<String, Value>) -> Result<()> {
    for (key, value) in doc {
        if key == "id" {
            continue;
        }
        stage_value(stage, def, &mut vec![key.clone()], value)?;
    }
    Ok(())
}

fn stage_value(stage: &mut EntityStage, def: Option<&CollectionDef>, path: &mut Vec<String>, value: &Value) -> Result<()> {
    match value {
        Value::Array(members) => {
            for member in members {
                stage.set_add(def, path, member.clone())?;
            }
        }
        Value::Object(fields) => {
            for (key, nested) in fields {
                path.push(key.clone());
                stage_value(stage, def, path, nested)?;
                path.pop();
            }
        }
        scalar => {
            stage.set(def, path, scalar.clone())?;
        }
    }
    Ok(())
}

fn get_path(doc: &Map<String, Value>, path: &[String]) -> Option<Value> {
    let (head, rest) = path.split_first()?;
    let mut current = doc.get(head)?;
    for segment in rest {
        current = current.get(segment)?;
    }
    Some(current.clone())
}
