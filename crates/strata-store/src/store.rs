//! The byte key/value store contract and its in-process implementation.
//!
//! `StoreFs` keeps two logical records per inode (see `crate::inode`),
//! and every mutation spans one transaction. Stores with native
//! transactions implement `Store` directly; anything that is just a
//! mutable map implements `SimpleStore` and gets the buffering adapter
//! for free.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard, RwLock};
use thiserror::Error;
use tracing::trace;

/// Errors from the store layer.
///
/// The filesystem maps these to `EIO` unless a more specific errno
/// applies.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Commit could not be applied
    #[error("commit failed: {0}")]
    Commit(String),

    /// Store unavailable or closed
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A byte key/value store with transactions.
pub trait Store: Send + Sync + 'static {
    /// Backend name, reported through filesystem metadata.
    fn name(&self) -> &'static str;

    /// Reads the value at `key`.
    fn get(&self, key: u64) -> Option<Bytes>;

    /// Writes `value` at `key`. Returns false when the key exists and
    /// `overwrite` is not set (the store is left unchanged).
    fn put(&self, key: u64, value: Bytes, overwrite: bool) -> bool;

    /// Deletes the value at `key`.
    fn delete(&self, key: u64);

    /// All keys currently present.
    fn keys(&self) -> Vec<u64>;

    /// Begins a transaction. Writes are invisible until `commit`;
    /// dropping the handle without committing aborts.
    fn begin(&self) -> Box<dyn Transaction + '_>;
}

/// A transaction handle.
pub trait Transaction {
    /// Reads `key`, observing this transaction's own writes.
    fn get(&mut self, key: u64) -> Option<Bytes>;

    /// Stages a write. Returns false when the key exists (in the store
    /// or staged) and `overwrite` is not set.
    fn put(&mut self, key: u64, value: Bytes, overwrite: bool) -> bool;

    /// Stages a deletion.
    fn delete(&mut self, key: u64);

    /// Applies every staged write atomically.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every staged write.
    fn abort(self: Box<Self>);
}

/// The surface a non-transactional store exposes to get transactions
/// through the buffering adapter.
pub trait SimpleStore: Send + Sync + 'static {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Reads the value at `key`.
    fn read(&self, key: u64) -> Option<Bytes>;

    /// Applies a batch of writes (`None` deletes) in one critical
    /// section.
    fn apply(&self, writes: Vec<(u64, Option<Bytes>)>) -> Result<(), StoreError>;

    /// All keys currently present.
    fn list(&self) -> Vec<u64>;

    /// Mutex serializing transactions against this store.
    fn serial(&self) -> &Mutex<()>;
}

/// Buffering transaction over a [`SimpleStore`].
///
/// Holds the store's serialization lock from begin to commit/abort, so
/// concurrent mutators observe serializable semantics.
pub struct SimpleTransaction<'s, S: SimpleStore + ?Sized> {
    store: &'s S,
    staged: HashMap<u64, Option<Bytes>>,
    _serial: MutexGuard<'s, ()>,
}

impl<'s, S: SimpleStore + ?Sized> SimpleTransaction<'s, S> {
    fn new(store: &'s S) -> Self {
        Self {
            store,
            staged: HashMap::new(),
            _serial: store.serial().lock(),
        }
    }
}

impl<S: SimpleStore + ?Sized> Transaction for SimpleTransaction<'_, S> {
    fn get(&mut self, key: u64) -> Option<Bytes> {
        match self.staged.get(&key) {
            Some(staged) => staged.clone(),
            None => self.store.read(key),
        }
    }

    fn put(&mut self, key: u64, value: Bytes, overwrite: bool) -> bool {
        if !overwrite && self.get(key).is_some() {
            return false;
        }
        self.staged.insert(key, Some(value));
        true
    }

    fn delete(&mut self, key: u64) {
        self.staged.insert(key, None);
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let writes: Vec<_> = self.staged.into_iter().collect();
        trace!(writes = writes.len(), "committing transaction");
        self.store.apply(writes)
    }

    fn abort(self: Box<Self>) {
        trace!(staged = self.staged.len(), "aborting transaction");
    }
}

impl<S: SimpleStore> Store for S {
    fn name(&self) -> &'static str {
        SimpleStore::name(self)
    }

    fn get(&self, key: u64) -> Option<Bytes> {
        self.read(key)
    }

    fn put(&self, key: u64, value: Bytes, overwrite: bool) -> bool {
        let _serial = self.serial().lock();
        if !overwrite && self.read(key).is_some() {
            return false;
        }
        self.apply(vec![(key, Some(value))]).is_ok()
    }

    fn delete(&self, key: u64) {
        let _serial = self.serial().lock();
        let _ = self.apply(vec![(key, None)]);
    }

    fn keys(&self) -> Vec<u64> {
        self.list()
    }

    fn begin(&self) -> Box<dyn Transaction + '_> {
        Box::new(SimpleTransaction::new(self))
    }
}

/// In-process store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<u64, Bytes>>,
    serial: Mutex<()>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimpleStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: u64) -> Option<Bytes> {
        self.data.read().get(&key).cloned()
    }

    fn apply(&self, writes: Vec<(u64, Option<Bytes>)>) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn list(&self) -> Vec<u64> {
        self.data.read().keys().copied().collect()
    }

    fn serial(&self) -> &Mutex<()> {
        &self.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        assert!(Store::put(&store, 1, Bytes::from_static(b"a"), false));
        assert_eq!(Store::get(&store, 1), Some(Bytes::from_static(b"a")));

        // No overwrite without the flag.
        assert!(!Store::put(&store, 1, Bytes::from_static(b"b"), false));
        assert!(Store::put(&store, 1, Bytes::from_static(b"b"), true));
        assert_eq!(Store::get(&store, 1), Some(Bytes::from_static(b"b")));

        Store::delete(&store, 1);
        assert_eq!(Store::get(&store, 1), None);
    }

    #[test]
    fn test_transaction_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        tx.put(1, Bytes::from_static(b"x"), true);
        tx.put(2, Bytes::from_static(b"y"), true);

        // Staged writes are visible inside the transaction only.
        assert_eq!(tx.get(1), Some(Bytes::from_static(b"x")));
        tx.commit().unwrap();

        assert_eq!(Store::get(&store, 1), Some(Bytes::from_static(b"x")));
        assert_eq!(Store::get(&store, 2), Some(Bytes::from_static(b"y")));
    }

    #[test]
    fn test_transaction_abort_discards() {
        let store = MemoryStore::new();
        Store::put(&store, 1, Bytes::from_static(b"keep"), true);

        let mut tx = store.begin();
        tx.put(1, Bytes::from_static(b"changed"), true);
        tx.delete(1);
        tx.put(2, Bytes::from_static(b"new"), true);
        tx.abort();

        assert_eq!(Store::get(&store, 1), Some(Bytes::from_static(b"keep")));
        assert_eq!(Store::get(&store, 2), None);
    }

    #[test]
    fn test_transaction_sees_own_deletes() {
        let store = MemoryStore::new();
        Store::put(&store, 1, Bytes::from_static(b"v"), true);

        let mut tx = store.begin();
        tx.delete(1);
        assert_eq!(tx.get(1), None);
        // Deleted within the transaction, so a non-overwrite put succeeds.
        assert!(tx.put(1, Bytes::from_static(b"w"), false));
        tx.commit().unwrap();

        assert_eq!(Store::get(&store, 1), Some(Bytes::from_static(b"w")));
    }

    #[test]
    fn test_keys() {
        let store = MemoryStore::new();
        Store::put(&store, 3, Bytes::from_static(b"a"), true);
        Store::put(&store, 9, Bytes::from_static(b"b"), true);
        let mut keys = store.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec![3, 9]);
    }
}
