/// Scenario 3: enum narrowing, tracked against changing data.
///
/// The same narrowing diff (`String` -> `String{enum:[a,b,c]}`) is
/// re-evaluated at three points against one growing/shrinking database:
/// empty (safe), after inserting an out-of-range value (unsafe), and after
/// updating that value back in range (safe again).
use serde_json::json;
use tridb_clock::{ClientId, HybridTimestamp};
use tridb_diff::{diff_schemas, get_schema_diff_issues};
use tridb_kv::{KvStore, MemoryKv};
use tridb_schema::{AttributeDescriptor, AttributeMap, AttributeOptions, CollectionDef, Schema};
use tridb_triples::{AttributePath, EntityId, Triple, TripleStore};

fn ts(tick: u64) -> HybridTimestamp {
    HybridTimestamp::new(tick, ClientId::new("c1"))
}

fn narrowing_diffs() -> Vec<tridb_diff::SchemaDiff> {
    let mut old_fields = AttributeMap::new();
    old_fields.insert("id".to_string(), AttributeDescriptor::id());
    old_fields.insert("status".to_string(), AttributeDescriptor::string());
    let mut old_schema = Schema::new(0);
    old_schema.collections.insert("users".to_string(), CollectionDef::new(old_fields));

    let mut new_fields = AttributeMap::new();
    new_fields.insert("id".to_string(), AttributeDescriptor::id());
    new_fields.insert(
        "status".to_string(),
        AttributeDescriptor::string().with_options(AttributeOptions::new().with_enum(vec![json!("a"), json!("b"), json!("c")])),
    );
    let mut new_schema = Schema::new(1);
    new_schema.collections.insert("users".to_string(), CollectionDef::new(new_fields));

    diff_schemas(&old_schema, &new_schema)
}

#[test]
fn test_scenario_03_enum_narrowing_tracks_data_through_insert_and_update() {
    let kv = MemoryKv::new();
    let diffs = narrowing_diffs();

    // GIVEN an empty database, the narrowing diff is unsafe but does not
    // violate existing data.
    kv.transact(|tx| {
        let issues = get_schema_diff_issues(tx, &diffs)?;
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].violates_existing_data);
        Ok(())
    })
    .expect("should evaluate against empty db");

    // WHEN an entity is inserted with a value outside the narrowed enum
    kv.transact(|tx| {
        let entity = EntityId::new("users", "1").unwrap();
        let path = AttributePath::for_field("users", &["status".to_string()]);
        TripleStore::write(tx, &[Triple::new(entity, path, json!("e"), ts(1))])
    })
    .expect("should insert");

    // THEN the same diff now violates existing data
    kv.transact(|tx| {
        let issues = get_schema_diff_issues(tx, &diffs)?;
        assert_eq!(issues.len(), 1);
        assert!(issues[0].violates_existing_data);
        Ok(())
    })
    .expect("should evaluate against populated db");

    // WHEN that entity is updated back to an in-range value
    kv.transact(|tx| {
        let entity = EntityId::new("users", "1").unwrap();
        let path = AttributePath::for_field("users", &["status".to_string()]);
        TripleStore::write(tx, &[Triple::new(entity, path, json!("a"), ts(2))])
    })
    .expect("should update");

    // THEN the diff is safe again
    kv.transact(|tx| {
        let issues = get_schema_diff_issues(tx, &diffs)?;
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].violates_existing_data);
        Ok(())
    })
    .expect("should evaluate after update");
}
