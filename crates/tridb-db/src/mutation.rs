//! Thin wrapper over [`tridb_triples::EntityStage`] that closes over the
//! collection's schema once, so `Db::update`'s mutator callback never has to
//! pass it on every call.

use serde_json::Value;
use tridb_errors::Result;
use tridb_schema::CollectionDef;
use tridb_triples::EntityStage;

pub struct Mutation<'a> {
    stage: &'a mut EntityStage,
    schema: Option<&'a CollectionDef>,
}

impl<'a> Mutation<'a> {
    pub(crate) fn new(stage: &'a mut EntityStage, schema: Option<&'a CollectionDef>) -> Self {
        Self { stage, schema }
    }

    pub fn get(&self, path: &[String]) -> Option<Value> {
        self.stage.get(path)
    }

    pub fn set(&mut self, path: &[String], value: Value) -> Result<()> {
        self.stage.set(self.schema, path, value)
    }

    pub fn set_add(&mut self, path: &[String], member: Value) -> Result<()> {
        self.stage.set_add(self.schema, path, member)
    }

    pub fn set_remove(&mut self, path: &[String], member: Value) -> Result<()> {
        self.stage.set_remove(self.schema, path, member)
    }

    pub fn set_has(&self, path: &[String], member: &Value) -> bool {
        self.stage.set_has(path, member)
    }
}
