//! # SledStore: Persistent Storage Engine
//!
//! The on-disk backend, built on sled's embedded key-value store. All ledger
//! tables live in one sled tree; the first byte of every key names the
//! table (see [`crate::config::prefix`]), so a single ordered keyspace
//! serves primary rows, secondary indexes, and sequences alike.
//!
//! ## Atomicity
//!
//! Committed transactions arrive as one `apply` call and are written as a
//! single sled `Batch`. Either every row of a transaction lands on disk or
//! none does.

use std::ops::Bound;
use std::path::Path;

use sled::{Batch, Db, Tree};

use super::{owned_bound, range_is_empty, KvIter, KvStore, StoreError, StoreResult, WriteOp};

/// Name of the sled tree holding all ledger tables.
const LEDGER_TREE: &str = "ledger";

/// Persistent ledger storage.
///
/// sled is thread-safe; clones share the same underlying database.
#[derive(Debug, Clone)]
pub struct SledStore {
    /// The underlying sled database handle.
    db: Db,
    /// All ledger tables, prefix-partitioned.
    tree: Tree,
}

impl SledStore {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let tree = db.open_tree(LEDGER_TREE)?;
        Ok(Self { db, tree })
    }

    /// Number of keys across all tables.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn range<'a>(&'a self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> StoreResult<KvIter<'a>> {
        if range_is_empty(lower, upper) {
            return Ok(Box::new(std::iter::empty()));
        }
        let iter = self
            .tree
            .range::<Vec<u8>, _>((owned_bound(lower), owned_bound(upper)))
            .map(|entry| {
                entry
                    .map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(StoreError::from)
            });
        Ok(Box::new(iter))
    }

    fn apply(&mut self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut batch = Batch::default();
        for op in ops {
            match op {
                WriteOp::Set(k, v) => batch.insert(k, v),
                WriteOp::Delete(k) => batch.remove(k),
            }
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }
}
