//! Migration executor.
//!
//! The schema itself lives in the reserved `_schema` collection, persisted
//! as a single JSON-encoded triple so schema reads/writes share the triple
//! store's transactional semantics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tridb_clock::LogicalClock;
use tridb_errors::{Result, TdbError, TdbErrorKind};
use tridb_kv::KvTransaction;
use tridb_schema::{AttributeDescriptor, AttributeMap, CollectionDef, Schema};
use tridb_triples::{AttributePath, EntityId, Triple, TripleStore, Value};

const SCHEMA_COLLECTION: &str = "_schema";
const SCHEMA_ENTITY: &str = "schema";

fn schema_entity() -> EntityId {
    EntityId::new(SCHEMA_COLLECTION, SCHEMA_ENTITY).expect("reserved id never contains '#'")
}

fn schema_path() -> AttributePath {
    AttributePath::for_field(SCHEMA_COLLECTION, &["document".to_string()])
}

/// Read the currently-persisted schema, or `Schema::new(0)` if none has ever
/// been written (a fresh store).
pub fn read_schema(tx: &mut dyn KvTransaction) -> Result<Schema> {
    match TripleStore::current_value(tx, &schema_entity(), &schema_path())? {
        Some((value, _)) => Ok(serde_json::from_value(value)?),
        None => Ok(Schema::new(0)),
    }
}

/// Persist `schema` wholesale, replacing whatever was there. Used by both
/// the migration executor and `Db::override_schema` (test/admin escape
/// hatch).
pub fn write_schema(tx: &mut dyn KvTransaction, schema: &Schema, clock: &LogicalClock) -> Result<()> {
    let value = serde_json::to_value(schema)?;
    let triple = Triple::new(schema_entity(), schema_path(), value, clock.tick());
    TripleStore::write(tx, &[triple])
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Direction {
    Up,
    Down,
}

/// One `up`/`down` schema operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOp {
    CreateCollection {
        collection: String,
        schema: AttributeMap,
    },
    DropCollection {
        collection: String,
    },
    AddAttribute {
        collection: String,
        path: Vec<String>,
        descriptor: AttributeDescriptor,
    },
    DropAttribute {
        collection: String,
        path: Vec<String>,
    },
    RenameAttribute {
        collection: String,
        from: Vec<String>,
        to: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub version: u32,
    pub parent: u32,
    pub up: Vec<MigrationOp>,
    pub down: Vec<MigrationOp>,
}

/// Apply every eligible migration in `migrations`, repeatedly, until none
/// remain eligible. Each eligible migration runs in its own transaction-local
/// step (the caller is expected to have already opened `tx`); on success the
/// schema (including its version) is rewritten in the same transaction.
///
/// Returns the versions applied, in application order.
pub fn migrate(
    tx: &mut dyn KvTransaction,
    migrations: &[Migration],
    direction: Direction,
    clock: &LogicalClock,
) -> Result<Vec<u32>> {
    let mut current = read_schema(tx)?;
    let mut applied = Vec::new();

    loop {
        let next = migrations.iter().find(|m| match direction {
            Direction::Up => m.parent == current.version,
            Direction::Down => m.version == current.version,
        });
        let Some(migration) = next else { break };

        let ops = match direction {
            Direction::Up => &migration.up,
            Direction::Down => &migration.down,
        };
        for op in ops {
            apply_op(tx, &mut current, op, clock)?;
        }
        current.version = match direction {
            Direction::Up => migration.version,
            Direction::Down => migration.parent,
        };
        write_schema(tx, &current, clock)?;
        applied.push(current.version);
    }

    Ok(applied)
}

/// Apply one op immediately, outside the `(version, parent)` migration-chain
/// gate: bumps `schema.version` by exactly one and persists the result. Used
/// by `Db`'s direct `createCollection`/`addAttribute`/etc. operations, which
/// are ad hoc requests rather than a declared bidirectional migration.
pub fn apply_single(tx: &mut dyn KvTransaction, op: &MigrationOp, clock: &LogicalClock) -> Result<Schema> {
    let mut schema = read_schema(tx)?;
    apply_op(tx, &mut schema, op, clock)?;
    schema.version += 1;
    write_schema(tx, &schema, clock)?;
    Ok(schema)
}

fn apply_op(tx: &mut dyn KvTransaction, schema: &mut Schema, op: &MigrationOp, clock: &LogicalClock) -> Result<()> {
    match op {
        MigrationOp::CreateCollection { collection, schema: fields } => {
            if schema.collections.contains_key(collection) {
                return Err(invalid_op(format!("collection '{collection}' already exists")));
            }
            schema.collections.insert(collection.clone(), CollectionDef::new(fields.clone()));
            Ok(())
        }
        MigrationOp::DropCollection { collection } => {
            if schema.collections.remove(collection).is_none() {
                return Err(invalid_op(format!("collection '{collection}' does not exist")));
            }
            purge_collection_data(tx, collection, clock)
        }
        MigrationOp::AddAttribute { collection, path, descriptor } => {
            let def = collection_mut(schema, collection)?;
            insert_at_path(&mut def.schema, path, descriptor.clone())
        }
        MigrationOp::DropAttribute { collection, path } => {
            let def = collection_mut(schema, collection)?;
            remove_at_path(&mut def.schema, path).map(|_| ())
        }
        MigrationOp::RenameAttribute { collection, from, to } => {
            let def = collection_mut(schema, collection)?;
            let descriptor = remove_at_path(&mut def.schema, from)?;
            let is_set = descriptor.unwrap_optional().type_tag() == "set";
            insert_at_path(&mut def.schema, to, descriptor)?;
            if is_set {
                rewrite_set_rename(tx, collection, from, to, clock)
            } else {
                rewrite_scalar_rename(tx, collection, from, to, clock)
            }
        }
    }
}

fn collection_mut<'a>(schema: &'a mut Schema, collection: &str) -> Result<&'a mut CollectionDef> {
    schema
        .collections
        .get_mut(collection)
        .ok_or_else(|| invalid_op(format!("collection '{collection}' does not exist")))
}

fn insert_at_path(map: &mut AttributeMap, path: &[String], descriptor: AttributeDescriptor) -> Result<()> {
    let (head, rest) = path
        .split_first()
        .ok_or_else(|| invalid_op("attribute path must not be empty".to_string()))?;
    if rest.is_empty() {
        map.insert(head.clone(), descriptor);
        return Ok(());
    }
    let child = map
        .get_mut(head)
        .ok_or_else(|| invalid_op(format!("no attribute '{head}' to descend into")))?;
    match child {
        AttributeDescriptor::Record { fields } => insert_at_path(fields, rest, descriptor),
        _ => Err(invalid_op(format!("'{head}' is not a record, cannot descend further"))),
    }
}

fn remove_at_path(map: &mut AttributeMap, path: &[String]) -> Result<AttributeDescriptor> {
    let (head, rest) = path
        .split_first()
        .ok_or_else(|| invalid_op("attribute path must not be empty".to_string()))?;
    if rest.is_empty() {
        return map
            .remove(head)
            .ok_or_else(|| invalid_op(format!("no attribute '{head}' to remove")));
    }
    let child = map
        .get_mut(head)
        .ok_or_else(|| invalid_op(format!("no attribute '{head}' to descend into")))?;
    match child {
        AttributeDescriptor::Record { fields } => remove_at_path(fields, rest),
        _ => Err(invalid_op(format!("'{head}' is not a record, cannot descend further"))),
    }
}

fn rewrite_scalar_rename(
    tx: &mut dyn KvTransaction,
    collection: &str,
    from: &[String],
    to: &[String],
    clock: &LogicalClock,
) -> Result<()> {
    let rows = TripleStore::scan_attribute(tx, collection, from)?;
    for (entity, value, _) in rows {
        let ts = clock.tick();
        let old_path = AttributePath::for_field(collection, from);
        let new_path = AttributePath::for_field(collection, to);
        TripleStore::write(
            tx,
            &[
                Triple::tombstone(entity.clone(), old_path, ts.clone()),
                Triple::new(entity, new_path, value, ts),
            ],
        )?;
    }
    Ok(())
}

fn rewrite_set_rename(
    tx: &mut dyn KvTransaction,
    collection: &str,
    from: &[String],
    to: &[String],
    clock: &LogicalClock,
) -> Result<()> {
    let rows = TripleStore::scan_set_members(tx, collection, from)?;
    for (entity, members) in rows {
        let mut triples = Vec::new();
        for member in members {
            let ts = clock.tick();
            let old_member_path = AttributePath::for_set_member(collection, from, &member);
            let new_member_path = AttributePath::for_set_member(collection, to, &member);
            triples.push(Triple::tombstone(entity.clone(), old_member_path, ts.clone()));
            triples.push(Triple::new(entity.clone(), new_member_path, Value::Bool(true), ts));
        }
        TripleStore::write(tx, &triples)?;
    }
    Ok(())
}

fn purge_collection_data(tx: &mut dyn KvTransaction, collection: &str, clock: &LogicalClock) -> Result<()> {
    let ids = TripleStore::collection_entity_ids(tx, collection)?;
    for external_id in ids {
        let entity = EntityId::new(collection, external_id)?;
        TripleStore::tombstone_entity(tx, &entity, &clock.tick())?;
    }
    Ok(())
}

fn invalid_op(message: String) -> TdbError {
    TdbError::new(TdbErrorKind::InvalidMigrationOperation)
        .with_op("migrate::apply_op")
        .with_message(message)
}
