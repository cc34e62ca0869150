use tridb_db::{Db, DbOptions};
use tridb_diff::{Direction, Migration, MigrationOp};
use tridb_errors::TdbErrorKind;
use tridb_schema::{AttributeDescriptor, AttributeMap, Schema};

fn users_migration() -> Migration {
    let mut fields = AttributeMap::new();
    fields.insert("id".to_string(), AttributeDescriptor::id());
    Migration {
        version: 1,
        parent: 0,
        up: vec![MigrationOp::CreateCollection { collection: "users".to_string(), schema: fields }],
        down: vec![MigrationOp::DropCollection { collection: "users".to_string() }],
    }
}

#[test]
fn providing_both_schema_and_migrations_is_rejected() {
    let err = Db::new(DbOptions {
        schema: Some(Schema::new(0)),
        migrations: Some(vec![users_migration()]),
        ..Default::default()
    })
    .expect_err("construction should reject schema+migrations together");
    assert_eq!(err.kind(), TdbErrorKind::InvalidSchema);
}

#[test]
fn providing_neither_yields_a_schemaless_db() {
    let db = Db::new(DbOptions::default()).expect("schemaless construction should succeed");
    let rows = db.fetch(&tridb_db::Query::new("anything")).expect("fetch on an unknown collection is just empty");
    assert!(rows.is_empty());
}

#[test]
fn providing_migrations_runs_them_forward_at_construction() {
    let db = Db::new(DbOptions { migrations: Some(vec![users_migration()]), ..Default::default() })
        .expect("construction should run migrations");
    db.insert("users", serde_json::json!({}).as_object().unwrap(), Some("1".to_string()))
        .expect("collection declared by the migration should accept inserts");
}

#[test]
fn migrate_direction_down_reverts_a_previously_applied_migration() {
    let db = Db::new(DbOptions::default()).expect("construction should succeed");
    let applied = db.migrate(&[users_migration()], Direction::Up).expect("up migration should apply");
    assert_eq!(applied, vec![1]);
    db.insert("users", serde_json::json!({}).as_object().unwrap(), Some("1".to_string()))
        .expect("collection exists after the up migration");

    let reverted = db.migrate(&[users_migration()], Direction::Down).expect("down migration should apply");
    assert_eq!(reverted, vec![0]);

    let rows = db.fetch(&tridb_db::Query::new("users")).expect("fetch should not error");
    assert!(rows.is_empty(), "down migration should purge the collection's data");
}
