//! # Storage Module
//!
//! The persistence boundary for the whole workspace. Nothing above this
//! module knows which engine is underneath.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs         KvStore trait, WriteOp, StoreError, atomic()
//! memory.rs      BTreeMap-backed store for tests and embedding
//! db.rs          sled-backed persistent store
//! cache.rs       transactional write cache over any KvStore
//! keys.rs        order-preserving key encoding
//! table.rs       typed records, secondary indexes, sequences
//! pagination.rs  cursor-based page requests and responses
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! operation → CacheStore (buffered writes) → commit → WriteOp batch → backend
//! ```
//!
//! Every mutating operation runs inside a [`CacheStore`]. If the operation
//! fails at any point the cache is dropped and the backend never sees a
//! single write. On success the whole buffer lands in one atomic batch.

pub mod cache;
pub mod db;
pub mod keys;
pub mod memory;
pub mod pagination;
pub mod table;

use std::ops::Bound;

pub use cache::CacheStore;
pub use db::SledStore;
pub use memory::MemStore;
pub use pagination::{PageRequest, PageResponse};
pub use table::{IndexKey, Record};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{table} not found: {key}")]
    NotFound { table: &'static str, key: String },

    #[error("{table} already exists: {key}")]
    AlreadyExists { table: &'static str, key: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------------

/// A raw key/value pair.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Ascending iterator over a key range. Dropping it releases the cursor.
pub type KvIter<'a> = Box<dyn Iterator<Item = StoreResult<KvPair>> + 'a>;

/// A single buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered key-value storage.
///
/// Implementations must return `range` results in ascending byte order and
/// apply `apply` batches atomically.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()>;

    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    fn range<'a>(&'a self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> StoreResult<KvIter<'a>>;

    /// Applies a batch of writes as one unit.
    fn apply(&mut self, ops: Vec<WriteOp>) -> StoreResult<()>;

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Runs `f` inside a fresh write cache over `store` and commits the cache
/// only if `f` succeeds.
pub fn atomic<T, E, F>(store: &mut dyn KvStore, f: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: FnOnce(&mut CacheStore<'_>) -> Result<T, E>,
{
    let mut cache = CacheStore::new(store);
    let out = f(&mut cache)?;
    cache.commit()?;
    Ok(out)
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (empty prefix or all `0xFF`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// `true` if the bounds describe a range no key can fall into. BTreeMap
/// panics on such ranges, so backends check first.
pub(crate) fn range_is_empty(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

pub(crate) fn owned_bound(bound: Bound<&[u8]>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(b) => Bound::Included(b.to_vec()),
        Bound::Excluded(b) => Bound::Excluded(b.to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    }
}
