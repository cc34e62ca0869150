//! In-process reference [`KvStore`] implementation.
//!
//! Optimistic concurrency: a transaction reads a snapshot of the store at
//! the version it began, tracks which keys it touched, and at commit time
//! checks those keys haven't been written by a transaction that committed
//! in between. Overlapping writers serialize; non-overlapping ones don't
//! block each other.

use crate::{Key, KvStore, KvTransaction};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tridb_errors::{Result, TdbError, TdbErrorKind};

#[derive(Debug, Clone)]
struct VersionedValue {
    value: Vec<u8>,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    map: BTreeMap<Key, VersionedValue>,
    next_version: u64,
}

/// In-memory, non-durable [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

enum Write {
    Put(Vec<u8>),
    Delete,
}

/// A transaction against [`MemoryKv`].
struct MemoryTransaction<'a> {
    store: &'a MemoryKv,
    snapshot: BTreeMap<Key, VersionedValue>,
    read_versions: BTreeMap<Key, u64>,
    writes: BTreeMap<Key, Write>,
}

impl<'a> MemoryTransaction<'a> {
    fn new(store: &'a MemoryKv) -> Self {
        let inner = store.inner.lock().expect("kv mutex poisoned");
        Self {
            store,
            snapshot: inner.map.clone(),
            read_versions: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    fn local_view(&self, key: &Key) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(Write::Put(v)) => Some(v.clone()),
            Some(Write::Delete) => None,
            None => self.snapshot.get(key).map(|v| v.value.clone()),
        }
    }

    fn record_read(&mut self, key: &Key) {
        if self.writes.contains_key(key) || self.read_versions.contains_key(key) {
            return;
        }
        let version = self.snapshot.get(key).map(|v| v.version).unwrap_or(0);
        self.read_versions.insert(key.clone(), version);
    }

    fn commit(self) -> Result<()> {
        let mut inner = self.store.inner.lock().expect("kv mutex poisoned");
        for (key, expected_version) in &self.read_versions {
            let current_version = inner.map.get(key).map(|v| v.version).unwrap_or(0);
            if current_version != *expected_version {
                return Err(TdbError::new(TdbErrorKind::TransactionConflict)
                    .with_op("commit")
                    .with_message(format!(
                        "key was modified by a concurrent transaction: {:?}",
                        key.as_bytes()
                    )));
            }
        }

        inner.next_version += 1;
        let commit_version = inner.next_version;
        for (key, write) in self.writes {
            match write {
                Write::Put(value) => {
                    inner.map.insert(
                        key,
                        VersionedValue {
                            value,
                            version: commit_version,
                        },
                    );
                }
                Write::Delete => {
                    inner.map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

impl<'a> KvTransaction for MemoryTransaction<'a> {
    fn get(&mut self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.record_read(key);
        Ok(self.local_view(key))
    }

    fn range(&mut self, prefix: &Key) -> Result<Vec<(Key, Vec<u8>)>> {
        let mut keys: std::collections::BTreeSet<Key> = self
            .snapshot
            .keys()
            .filter(|k| prefix.is_prefix_of(k))
            .cloned()
            .collect();
        keys.extend(
            self.writes
                .keys()
                .filter(|k| prefix.is_prefix_of(k))
                .cloned(),
        );

        let mut out = Vec::new();
        for key in keys {
            self.record_read(&key);
            if let Some(value) = self.local_view(&key) {
                out.push((key, value));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn put(&mut self, key: Key, value: Vec<u8>) {
        self.writes.insert(key, Write::Put(value));
    }

    fn delete(&mut self, key: Key) {
        self.writes.insert(key, Write::Delete);
    }
}

impl KvStore for MemoryKv {
    fn transact<T>(&self, f: impl FnOnce(&mut dyn KvTransaction) -> Result<T>) -> Result<T> {
        let mut txn = MemoryTransaction::new(self);
        let result = f(&mut txn)?;
        txn.commit()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::from_segments([s])
    }

    #[test]
    fn put_then_get_in_same_transaction() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            tx.put(key("a"), b"1".to_vec());
            assert_eq!(tx.get(&key("a")).unwrap(), Some(b"1".to_vec()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn writes_are_visible_in_a_later_transaction() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            tx.put(key("a"), b"1".to_vec());
            Ok(())
        })
        .unwrap();

        kv.transact(|tx| {
            assert_eq!(tx.get(&key("a")).unwrap(), Some(b"1".to_vec()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn aborted_transaction_writes_nothing() {
        let kv = MemoryKv::new();
        let result: Result<()> = kv.transact(|tx| {
            tx.put(key("a"), b"1".to_vec());
            Err(TdbError::new(TdbErrorKind::Internal).with_message("boom"))
        });
        assert!(result.is_err());

        kv.transact(|tx| {
            assert_eq!(tx.get(&key("a")).unwrap(), None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn range_returns_only_matching_prefix_sorted() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            tx.put(Key::from_segments(["users", "2"]), b"b".to_vec());
            tx.put(Key::from_segments(["users", "1"]), b"a".to_vec());
            tx.put(Key::from_segments(["posts", "1"]), b"c".to_vec());
            Ok(())
        })
        .unwrap();

        kv.transact(|tx| {
            let results = tx.range(&Key::from_segments(["users"])).unwrap();
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].1, b"a".to_vec());
            assert_eq!(results[1].1, b"b".to_vec());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_removes_key() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            tx.put(key("a"), b"1".to_vec());
            Ok(())
        })
        .unwrap();
        kv.transact(|tx| {
            tx.delete(key("a"));
            Ok(())
        })
        .unwrap();
        kv.transact(|tx| {
            assert_eq!(tx.get(&key("a")).unwrap(), None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn concurrent_write_to_same_key_conflicts_on_commit() {
        let kv = MemoryKv::new();
        kv.transact(|tx| {
            tx.put(key("a"), b"0".to_vec());
            Ok(())
        })
        .unwrap();

        // Simulate transaction 1 reading then staging a write, but a
        // second transaction committing a write to the same key first.
        let mut txn1 = MemoryTransaction::new(&kv);
        txn1.get(&key("a")).unwrap();
        txn1.put(key("a"), b"1".to_vec());

        kv.transact(|tx| {
            tx.put(key("a"), b"2".to_vec());
            Ok(())
        })
        .unwrap();

        let result = txn1.commit();
        assert!(matches!(
            result,
            Err(ref e) if e.kind() == TdbErrorKind::TransactionConflict
        ));
    }

    #[test]
    fn non_overlapping_writers_both_commit() {
        let kv = MemoryKv::new();
        let mut txn1 = MemoryTransaction::new(&kv);
        txn1.put(key("a"), b"1".to_vec());

        kv.transact(|tx| {
            tx.put(key("b"), b"2".to_vec());
            Ok(())
        })
        .unwrap();

        assert!(txn1.commit().is_ok());
    }
}
