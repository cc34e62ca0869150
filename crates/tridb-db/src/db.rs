//! `Db`: the facade wiring the triple store, schema model, and migration
//! executor behind one set of public operations.
//!
//! Every public method opens exactly one `KvStore::transact` call, drives it
//! to completion, and — for methods that write — notifies subscriptions on
//! the touched collections once the transaction has committed. Scheduling is
//! synchronous throughout: there is no `async fn` here. A caller embedding
//! this crate in an async runtime wraps calls in `spawn_blocking`.

use crate::query::Query;
use crate::subscription::{Registry, Subscription, SubscriptionEntry};
use crate::tx::Tx;
use crate::{log_op_end, log_op_error, log_op_start};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;
use tridb_clock::{ClientId, HybridTimestamp, LogicalClock};
use tridb_diff::{migrate, write_schema, Direction, Migration, MigrationOp};
use tridb_errors::{Result, TdbError, TdbErrorKind};
use tridb_kv::{KvStore, MemoryKv};
use tridb_schema::{AttributeDescriptor, Schema};
use tridb_triples::Variables;

/// Construction options for [`Db::new`] / [`Db::with_store`].
///
/// There is deliberately no storage-scope or tenant-routing option here:
/// `KvStore` names a single backend, and serving multiple tenants over a
/// network is out of scope for an embedded store.
#[derive(Default)]
pub struct DbOptions {
    /// Install this schema directly via `overrideSchema` semantics. Mutually
    /// exclusive with `migrations`.
    pub schema: Option<Schema>,
    /// Run these migrations forward from whatever schema is already
    /// persisted (or `Schema::new(0)` for a fresh store). Mutually
    /// exclusive with `schema`.
    pub migrations: Option<Vec<Migration>>,
    /// Identifies this client's logical clock. Defaults to a fresh random id.
    pub client_id: Option<ClientId>,
    /// Initial session-variable bindings. Defaults to empty.
    pub variables: Option<Variables>,
}

/// The embedded document database. Generic over the KV adapter so callers
/// can plug in a durable backend; defaults to the in-memory reference
/// implementation.
pub struct Db<K: KvStore = MemoryKv> {
    kv: K,
    clock: LogicalClock,
    variables: Variables,
    subscriptions: Registry,
    next_sub_id: AtomicU64,
}

impl Db<MemoryKv> {
    /// Construct a `Db` over the in-memory reference `KvStore`.
    pub fn new(options: DbOptions) -> Result<Self> {
        Self::with_store(MemoryKv::new(), options)
    }
}

impl<K: KvStore> Db<K> {
    /// Construct a `Db` over any `KvStore` implementation.
    ///
    /// `options.schema` and `options.migrations` are mutually exclusive;
    /// providing both is `InvalidSchema`. Providing neither leaves whatever
    /// schema is already persisted untouched (a schemaless DB reads back as
    /// `Schema::new(0)`, per `tridb_diff::read_schema`).
    pub fn with_store(kv: K, options: DbOptions) -> Result<Self> {
        if options.schema.is_some() && options.migrations.is_some() {
            return Err(TdbError::new(TdbErrorKind::InvalidSchema)
                .with_op("db::with_store")
                .with_message("schema and migrations are mutually exclusive"));
        }
        let clock = LogicalClock::new(options.client_id.unwrap_or_else(|| ClientId::new(uuid::Uuid::now_v7().to_string())));
        let variables = options.variables.unwrap_or_default();

        if let Some(schema) = &options.schema {
            kv.transact(|tx| write_schema(tx, schema, &clock))?;
        } else if let Some(migrations) = &options.migrations {
            kv.transact(|tx| migrate(tx, migrations, Direction::Up, &clock).map(|_| ()))?;
        }

        Ok(Self {
            kv,
            clock,
            variables,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            next_sub_id: AtomicU64::new(0),
        })
    }

    /// Insert `doc` as a new entity in `collection`, generating an id if
    /// `id` is `None`. Returns the commit timestamp.
    pub fn insert(&self, collection: &str, doc: &Map<String, Value>, id: Option<String>) -> Result<HybridTimestamp> {
        let start = Instant::now();
        log_op_start!("db::insert", collection = collection);
        let result = self.kv.transact(|raw| {
            let schema = tridb_diff::read_schema(raw)?;
            let mut tx = Tx::new(raw, &self.clock, &self.variables, schema);
            tx.insert(collection, doc, id)
        });
        match &result {
            Ok(_) => {
                log_op_end!("db::insert", duration_ms = start.elapsed().as_millis() as u64, collection = collection);
                self.notify(collection)?;
            }
            Err(err) => log_op_error!("db::insert", err, duration_ms = start.elapsed().as_millis() as u64),
        }
        result
    }

    /// Fetch `id` from `collection`, apply `mutator` to a staged view of its
    /// current document, and commit the resulting changes.
    pub fn update(&self, collection: &str, id: &str, mutator: impl FnOnce(&mut crate::Mutation) -> Result<()>) -> Result<()> {
        let start = Instant::now();
        log_op_start!("db::update", collection = collection, entity_id = id);
        let result = self.kv.transact(|raw| {
            let schema = tridb_diff::read_schema(raw)?;
            let mut tx = Tx::new(raw, &self.clock, &self.variables, schema);
            tx.update(collection, id, mutator)
        });
        match &result {
            Ok(_) => {
                log_op_end!("db::update", duration_ms = start.elapsed().as_millis() as u64, collection = collection);
                self.notify(collection)?;
            }
            Err(err) => log_op_error!("db::update", err, duration_ms = start.elapsed().as_millis() as u64),
        }
        result
    }

    /// Run `query` against the current committed state.
    pub fn fetch(&self, query: &Query) -> Result<Vec<Map<String, Value>>> {
        self.kv.transact(|raw| {
            let schema = tridb_diff::read_schema(raw)?;
            let mut tx = Tx::new(raw, &self.clock, &self.variables, schema);
            tx.fetch(query)
        })
    }

    /// Fetch a single entity by id, or `None` if it does not exist (or is
    /// tombstoned).
    pub fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Map<String, Value>>> {
        self.kv.transact(|raw| {
            let schema = tridb_diff::read_schema(raw)?;
            let mut tx = Tx::new(raw, &self.clock, &self.variables, schema);
            tx.fetch_by_id(collection, id)
        })
    }

    /// Run `cb` inside one transaction, notifying every collection it
    /// touched once it commits.
    pub fn transact<T>(&self, cb: impl FnOnce(&mut Tx) -> Result<T>) -> Result<T> {
        let mut touched = Vec::new();
        let result = self.kv.transact(|raw| {
            let schema = tridb_diff::read_schema(raw)?;
            let mut tx = Tx::new(raw, &self.clock, &self.variables, schema);
            let value = cb(&mut tx)?;
            touched = tx.touched().map(str::to_string).collect();
            Ok(value)
        });
        if result.is_ok() {
            for collection in &touched {
                self.notify(collection)?;
            }
        }
        result
    }

    /// Open a subscription: an initial result set plus an `mpsc::Receiver`
    /// delivering the new result set after every write to `query`'s
    /// collection.
    pub fn subscribe(&self, query: Query) -> Result<Subscription> {
        let initial = self.fetch(&query)?;
        let (sender, receiver) = mpsc::channel();
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().expect("subscriptions lock poisoned").push(SubscriptionEntry {
            id,
            collection: query.collection,
            filter: query.filter,
            sender,
        });
        Ok(Subscription::new(initial, receiver, id, self.subscriptions.clone()))
    }

    /// Re-run every subscription registered against `collection` and deliver
    /// the new result set. Entries whose receiver has been dropped are
    /// pruned.
    fn notify(&self, collection: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().expect("subscriptions lock poisoned");
        let mut dead = Vec::new();
        for (index, entry) in subscriptions.iter().enumerate() {
            if entry.collection != collection {
                continue;
            }
            let query = Query { collection: entry.collection.clone(), filter: entry.filter.clone() };
            let result = self.fetch(&query);
            if entry.sender.send(result).is_err() {
                dead.push(index);
            }
        }
        for index in dead.into_iter().rev() {
            subscriptions.remove(index);
        }
        Ok(())
    }

    /// Declare a new collection with `schema`, outside any migration chain.
    pub fn create_collection(&self, collection: &str, schema: tridb_schema::AttributeMap) -> Result<()> {
        self.apply_single(MigrationOp::CreateCollection { collection: collection.to_string(), schema })
    }

    /// Drop `collection` and purge its data triples.
    pub fn drop_collection(&self, collection: &str) -> Result<()> {
        self.apply_single(MigrationOp::DropCollection { collection: collection.to_string() })
    }

    /// Add a new attribute at `path` within `collection`.
    pub fn add_attribute(&self, collection: &str, path: Vec<String>, descriptor: AttributeDescriptor) -> Result<()> {
        self.apply_single(MigrationOp::AddAttribute { collection: collection.to_string(), path, descriptor })
    }

    /// Drop the attribute at `path` within `collection`.
    pub fn drop_attribute(&self, collection: &str, path: Vec<String>) -> Result<()> {
        self.apply_single(MigrationOp::DropAttribute { collection: collection.to_string(), path })
    }

    /// Rename an attribute from one path to another, rewriting existing data
    /// triples in place.
    pub fn rename_attribute(&self, collection: &str, from: Vec<String>, to: Vec<String>) -> Result<()> {
        self.apply_single(MigrationOp::RenameAttribute { collection: collection.to_string(), from, to })
    }

    fn apply_single(&self, op: MigrationOp) -> Result<()> {
        let collection = op_collection(&op).to_string();
        let start = Instant::now();
        log_op_start!("db::apply_single", collection = collection.as_str());
        let result = self.kv.transact(|tx| tridb_diff::apply_single(tx, &op, &self.clock).map(|_| ()));
        match &result {
            Ok(_) => {
                log_op_end!("db::apply_single", duration_ms = start.elapsed().as_millis() as u64, collection = collection.as_str());
                self.notify(&collection)?;
            }
            Err(err) => log_op_error!("db::apply_single", err, duration_ms = start.elapsed().as_millis() as u64),
        }
        result
    }

    /// Run every eligible migration in `direction`, repeatedly, until none
    /// remain eligible. Returns the versions applied in application order.
    pub fn migrate(&self, migrations: &[Migration], direction: Direction) -> Result<Vec<u32>> {
        self.kv.transact(|tx| migrate(tx, migrations, direction, &self.clock))
    }

    /// Replace `_schema` wholesale without running a data migration. Test
    /// and admin escape hatch.
    pub fn override_schema(&self, schema: &Schema) -> Result<()> {
        self.kv.transact(|tx| write_schema(tx, schema, &self.clock))
    }

    /// The shared session-variable scope. Subscriptions snapshot it at
    /// `subscribe` time; this handle mutates it for everyone else going
    /// forward.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Bind `name` to `value` in the shared session-variable scope.
    pub fn update_variables(&self, name: impl Into<String>, value: Value) {
        self.variables.set(name, value);
    }
}

fn op_collection(op: &MigrationOp) -> &str {
    match op {
        MigrationOp::CreateCollection { collection, .. }
        | MigrationOp::DropCollection { collection }
        | MigrationOp::AddAttribute { collection, .. }
        | MigrationOp::DropAttribute { collection, .. }
        | MigrationOp::RenameAttribute { collection, .. } => collection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tridb_schema::AttributeDescriptor as Attr;
    use tridb_triples::Predicate as Pred;

    fn users_schema() -> tridb_schema::AttributeMap {
        let mut fields = tridb_schema::AttributeMap::new();
        fields.insert("id".to_string(), Attr::id());
        fields.insert("name".to_string(), Attr::string());
        fields.insert("tags".to_string(), Attr::set(Attr::string()));
        fields
    }

    fn test_db() -> Db {
        let mut schema = Schema::new(0);
        schema.collections.insert("users".to_string(), tridb_schema::CollectionDef::new(users_schema()));
        Db::new(DbOptions { schema: Some(schema), ..Default::default() }).unwrap()
    }

    #[test]
    fn construction_rejects_schema_and_migrations_together() {
        let err = Db::new(DbOptions {
            schema: Some(Schema::new(0)),
            migrations: Some(vec![]),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), TdbErrorKind::InvalidSchema);
    }

    #[test]
    fn insert_then_fetch_by_id_round_trips() {
        let db = test_db();
        db.insert("users", json!({ "name": "alice" }).as_object().unwrap(), Some("1".to_string())).unwrap();
        let doc = db.fetch_by_id("users", "1").unwrap().unwrap();
        assert_eq!(doc["name"], json!("alice"));
    }

    #[test]
    fn rename_attribute_preserves_data_and_drops_old_path() {
        let db = test_db();
        db.insert("users", json!({ "name": "x" }).as_object().unwrap(), Some("1".to_string())).unwrap();
        db.rename_attribute("users", vec!["name".to_string()], vec!["full_name".to_string()]).unwrap();
        let doc = db.fetch_by_id("users", "1").unwrap().unwrap();
        assert_eq!(doc["full_name"], json!("x"));
        assert!(doc.get("name").is_none());
    }

    #[test]
    fn write_rule_rejects_insert_and_leaves_no_triples() {
        let mut schema = Schema::new(0);
        let def = tridb_schema::CollectionDef::new(users_schema()).with_rules(json!({ "write": [false] }));
        schema.collections.insert("users".to_string(), def);
        let db = Db::new(DbOptions { schema: Some(schema), ..Default::default() }).unwrap();

        let err = db.insert("users", json!({ "name": "x" }).as_object().unwrap(), Some("1".to_string())).unwrap_err();
        assert_eq!(err.kind(), TdbErrorKind::WriteRuleViolation);
        assert!(db.fetch_by_id("users", "1").unwrap().is_none());
    }

    #[test]
    fn subscribe_delivers_initial_then_update_after_insert() {
        let db = test_db();
        let subscription = db.subscribe(Query::new("users")).unwrap();
        assert!(subscription.initial.is_empty());

        db.insert("users", json!({ "name": "alice" }).as_object().unwrap(), Some("1".to_string())).unwrap();

        let delivered = subscription.receiver.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["name"], json!("alice"));
    }

    #[test]
    fn dropped_subscription_is_pruned_on_next_write() {
        let db = test_db();
        let subscription = db.subscribe(Query::new("users")).unwrap();
        drop(subscription);

        db.insert("users", json!({ "name": "alice" }).as_object().unwrap(), Some("1".to_string())).unwrap();
        assert_eq!(db.subscriptions.lock().unwrap().len(), 0);
    }

    #[test]
    fn unsubscribe_removes_entry_immediately() {
        let db = test_db();
        let subscription = db.subscribe(Query::new("users")).unwrap();
        assert_eq!(db.subscriptions.lock().unwrap().len(), 1);
        subscription.unsubscribe();
        assert_eq!(db.subscriptions.lock().unwrap().len(), 0);
    }

    #[test]
    fn fetch_with_filter_excludes_non_matching() {
        let db = test_db();
        db.insert("users", json!({ "name": "alice" }).as_object().unwrap(), Some("1".to_string())).unwrap();
        db.insert("users", json!({ "name": "bob" }).as_object().unwrap(), Some("2".to_string())).unwrap();

        let filter = Pred::parse(&json!(["name", "=", "bob"])).unwrap();
        let rows = db.fetch(&Query::new("users").filter(filter)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("bob"));
    }

    #[test]
    fn update_variables_is_visible_to_later_filters() {
        let db = test_db();
        db.insert("users", json!({ "name": "alice" }).as_object().unwrap(), Some("1".to_string())).unwrap();
        db.update_variables("target", json!("alice"));

        let filter = Pred::parse(&json!(["name", "=", "$target"])).unwrap();
        let rows = db.fetch(&Query::new("users").filter(filter)).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
