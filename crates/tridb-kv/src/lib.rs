//! Ordered key/value adapter contract (C1).
//!
//! A minimal, transactional, range-scannable sorted map of tuple-keys to
//! opaque byte values. The triple store never talks to a storage backend
//! directly — everything above this crate goes through [`KvStore`].
//!
//! [`MemoryKv`] is the reference implementation: an in-process, non-durable
//! adapter good enough to exercise every transaction invariant (snapshot
//! isolation, serialized concurrent writers, `TransactionConflict` on
//! overlapping writes). A durable adapter is a pluggable concern external to
//! this crate.

mod key;
mod memory;

pub use key::{Key, Segment};
pub use memory::MemoryKv;

use tridb_errors::Result;

/// A transactional, range-scannable ordered key/value store.
pub trait KvStore {
    /// Run `f` inside a snapshot-isolated transaction. Commits if `f`
    /// returns `Ok` and no conflicting write was committed concurrently;
    /// otherwise the transaction's writes are discarded and the error
    /// (the caller's, or a fresh `TransactionConflict`) is returned.
    fn transact<T>(&self, f: impl FnOnce(&mut dyn KvTransaction) -> Result<T>) -> Result<T>;
}

/// A single read/write transaction against a [`KvStore`].
pub trait KvTransaction {
    /// Read the current value at `key`, if any.
    fn get(&mut self, key: &Key) -> Result<Option<Vec<u8>>>;

    /// Return every `(key, value)` pair whose key has `prefix` as a
    /// segment-boundary prefix, in ascending key order.
    fn range(&mut self, prefix: &Key) -> Result<Vec<(Key, Vec<u8>)>>;

    /// Stage a write. Visible to later reads in the same transaction;
    /// not visible to other transactions until commit.
    fn put(&mut self, key: Key, value: Vec<u8>);

    /// Stage a deletion.
    fn delete(&mut self, key: Key);
}
