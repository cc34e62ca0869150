/// Scenario 5: rename preserves data.
///
/// Renaming an attribute must carry the existing value to the new path and
/// leave no triple at the old one.
use serde_json::json;
use tridb_db::{Db, DbOptions};
use tridb_schema::{AttributeDescriptor, AttributeMap, CollectionDef, Schema};

fn users_db() -> Db {
    let mut fields = AttributeMap::new();
    fields.insert("id".to_string(), AttributeDescriptor::id());
    fields.insert("name".to_string(), AttributeDescriptor::string());
    let mut schema = Schema::new(0);
    schema.collections.insert("users".to_string(), CollectionDef::new(fields));
    Db::new(DbOptions { schema: Some(schema), ..Default::default() }).expect("should construct db")
}

#[test]
fn test_scenario_05_rename_attribute_carries_value_and_drops_old_path() {
    // GIVEN an entity with a `name` attribute
    let db = users_db();
    db.insert("users", json!({ "name": "x" }).as_object().unwrap(), Some("1".to_string()))
        .expect("should insert");

    // WHEN renaming name -> fullName
    db.rename_attribute("users", vec!["name".to_string()], vec!["fullName".to_string()])
        .expect("should rename");

    // THEN fetchById returns { fullName: "x" } and no `name` field remains
    let doc = db.fetch_by_id("users", "1").expect("should fetch").expect("entity should exist");
    assert_eq!(doc["fullName"], json!("x"));
    assert!(doc.get("name").is_none());
}

#[test]
fn test_scenario_05_rename_is_reflected_in_subsequent_fetch_queries() {
    let db = users_db();
    db.insert("users", json!({ "name": "alice" }).as_object().unwrap(), Some("1".to_string()))
        .expect("should insert");
    db.rename_attribute("users", vec!["name".to_string()], vec!["fullName".to_string()])
        .expect("should rename");

    let rows = db.fetch(&tridb_db::Query::new("users")).expect("should fetch");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["fullName"], json!("alice"));
}
