//! Typed tables over a `KvStore`.
//!
//! A [`Record`] names its table prefix, its primary key, and the secondary
//! index entries it should be reachable through. The free functions here
//! keep rows and index entries in step: `insert` refuses to clobber a
//! primary or unique key, `update` moves index entries when indexed fields
//! change, `delete` removes the row together with its index entries.
//!
//! ## Key Layout
//!
//! ```text
//! row:          [table, 0x00] ++ primary_key                 -> bincode(record)
//! unique index: [table, idx]  ++ index_key                   -> primary_key
//! multi index:  [table, idx]  ++ index_key ++ primary_key    -> primary_key
//! sequence:     [SEQUENCE, table] ++ scope                   -> u64 BE
//! ```

use std::marker::PhantomData;
use std::ops::Bound;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::pagination::{PageRequest, PageResponse};
use super::{prefix_end, KvIter, KvStore, StoreError, StoreResult};
use crate::config::{prefix, PaginationConfig};

/// Index id reserved for primary rows.
const PRIMARY: u8 = 0x00;

/// A persisted entity.
pub trait Record: Serialize + DeserializeOwned {
    /// Table prefix byte; unique across the workspace.
    const TABLE: u8;
    /// Human-readable entity name used in errors.
    const NAME: &'static str;

    fn primary_key(&self) -> Vec<u8>;

    /// Secondary index entries for this row. Index ids must be non-zero.
    fn index_keys(&self) -> Vec<IndexKey> {
        Vec::new()
    }
}

/// One secondary index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    pub index: u8,
    pub key: Vec<u8>,
    pub unique: bool,
}

impl IndexKey {
    pub fn unique(index: u8, key: Vec<u8>) -> Self {
        Self {
            index,
            key,
            unique: true,
        }
    }

    pub fn multi(index: u8, key: Vec<u8>) -> Self {
        Self {
            index,
            key,
            unique: false,
        }
    }

    fn entry_key(&self, table: u8, pk: &[u8]) -> Vec<u8> {
        let mut k = vec![table, self.index];
        k.extend_from_slice(&self.key);
        if !self.unique {
            k.extend_from_slice(pk);
        }
        k
    }
}

/// Where a scan reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Primary,
    Index(u8),
}

impl Scope {
    fn base<R: Record>(self) -> Vec<u8> {
        match self {
            Scope::Primary => vec![R::TABLE, PRIMARY],
            Scope::Index(idx) => vec![R::TABLE, idx],
        }
    }
}

fn row_key<R: Record>(pk: &[u8]) -> Vec<u8> {
    let mut k = vec![R::TABLE, PRIMARY];
    k.extend_from_slice(pk);
    k
}

fn encode<R: Record>(record: &R) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(record)?)
}

fn decode<R: Record>(bytes: &[u8]) -> StoreResult<R> {
    Ok(bincode::deserialize(bytes)?)
}

fn display_key(pk: &[u8]) -> String {
    hex::encode(pk)
}

// ---------------------------------------------------------------------------
// Row operations
// ---------------------------------------------------------------------------

pub fn get<R: Record>(store: &dyn KvStore, pk: &[u8]) -> StoreResult<Option<R>> {
    match store.get(&row_key::<R>(pk))? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Like [`get`], but absence is an error naming `id`.
pub fn must_get<R: Record>(store: &dyn KvStore, pk: &[u8], id: &str) -> StoreResult<R> {
    get(store, pk)?.ok_or_else(|| StoreError::NotFound {
        table: R::NAME,
        key: id.to_string(),
    })
}

/// Looks a row up through a unique index.
pub fn get_by_unique<R: Record>(
    store: &dyn KvStore,
    index: u8,
    key: &[u8],
) -> StoreResult<Option<R>> {
    let mut entry = vec![R::TABLE, index];
    entry.extend_from_slice(key);
    match store.get(&entry)? {
        Some(pk) => get(store, &pk),
        None => Ok(None),
    }
}

/// Inserts a new row. Fails if the primary key or any unique index entry
/// is already taken.
pub fn insert<R: Record>(store: &mut dyn KvStore, record: &R) -> StoreResult<()> {
    let pk = record.primary_key();
    if store.has(&row_key::<R>(&pk))? {
        return Err(StoreError::AlreadyExists {
            table: R::NAME,
            key: display_key(&pk),
        });
    }
    let indexes = record.index_keys();
    for idx in indexes.iter().filter(|i| i.unique) {
        if store.has(&idx.entry_key(R::TABLE, &pk))? {
            return Err(StoreError::AlreadyExists {
                table: R::NAME,
                key: display_key(&idx.key),
            });
        }
    }
    write_row(store, &pk, record, &indexes)
}

/// Replaces an existing row, moving any index entries whose key changed.
pub fn update<R: Record>(store: &mut dyn KvStore, record: &R) -> StoreResult<()> {
    let pk = record.primary_key();
    let old: R = get(store, &pk)?.ok_or_else(|| StoreError::NotFound {
        table: R::NAME,
        key: display_key(&pk),
    })?;
    let new_indexes = record.index_keys();
    for idx in old.index_keys() {
        if !new_indexes.contains(&idx) {
            store.delete(&idx.entry_key(R::TABLE, &pk))?;
        }
    }
    for idx in new_indexes.iter().filter(|i| i.unique) {
        let entry = idx.entry_key(R::TABLE, &pk);
        if let Some(owner) = store.get(&entry)? {
            if owner != pk {
                return Err(StoreError::AlreadyExists {
                    table: R::NAME,
                    key: display_key(&idx.key),
                });
            }
        }
    }
    write_row(store, &pk, record, &new_indexes)
}

/// Inserts or updates.
pub fn save<R: Record>(store: &mut dyn KvStore, record: &R) -> StoreResult<()> {
    if store.has(&row_key::<R>(&record.primary_key()))? {
        update(store, record)
    } else {
        insert(store, record)
    }
}

/// Removes a row and its index entries.
pub fn delete<R: Record>(store: &mut dyn KvStore, pk: &[u8]) -> StoreResult<()> {
    let old: R = get(store, pk)?.ok_or_else(|| StoreError::NotFound {
        table: R::NAME,
        key: display_key(pk),
    })?;
    for idx in old.index_keys() {
        store.delete(&idx.entry_key(R::TABLE, pk))?;
    }
    store.delete(&row_key::<R>(pk))
}

fn write_row<R: Record>(
    store: &mut dyn KvStore,
    pk: &[u8],
    record: &R,
    indexes: &[IndexKey],
) -> StoreResult<()> {
    store.set(&row_key::<R>(pk), encode(record)?)?;
    for idx in indexes {
        store.set(&idx.entry_key(R::TABLE, pk), pk.to_vec())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

/// Returns the next value of the sequence named by `scope` within table
/// `R`, starting at 1.
pub fn next_sequence<R: Record>(store: &mut dyn KvStore, scope: &[u8]) -> StoreResult<u64> {
    let mut key = vec![prefix::SEQUENCE, R::TABLE];
    key.extend_from_slice(scope);
    let current = match store.get(&key)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Serialization("invalid sequence bytes".into()))?;
            u64::from_be_bytes(arr)
        }
        None => 0,
    };
    let next = current + 1;
    store.set(&key, next.to_be_bytes().to_vec())?;
    Ok(next)
}

/// Next auto-increment id for table `R`.
pub fn next_id<R: Record>(store: &mut dyn KvStore) -> StoreResult<u64> {
    next_sequence::<R>(store, &[])
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

/// Typed iterator over a table or index span.
///
/// Yields `(cursor, record)` where `cursor` is the key suffix after the
/// scope base; feeding it back as a page key resumes at that row.
pub struct RecordIter<'a, R> {
    store: &'a dyn KvStore,
    inner: KvIter<'a>,
    base_len: usize,
    via_index: bool,
    _marker: PhantomData<R>,
}

impl<R: Record> Iterator for RecordIter<'_, R> {
    type Item = StoreResult<(Vec<u8>, R)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.inner.next()? {
            Ok(kv) => kv,
            Err(e) => return Some(Err(e)),
        };
        let cursor = key[self.base_len..].to_vec();
        let record = if self.via_index {
            match get::<R>(self.store, &value) {
                Ok(Some(r)) => Ok(r),
                Ok(None) => Err(StoreError::Serialization(format!(
                    "dangling {} index entry {}",
                    R::NAME,
                    display_key(&key)
                ))),
                Err(e) => Err(e),
            }
        } else {
            decode(&value)
        };
        Some(record.map(|r| (cursor, r)))
    }
}

/// Scans rows whose scope-relative key lies within `[lower, upper)`.
pub fn scan<'a, R: Record>(
    store: &'a dyn KvStore,
    scope: Scope,
    lower: &[u8],
    upper: Option<&[u8]>,
) -> StoreResult<RecordIter<'a, R>> {
    let base = scope.base::<R>();
    let mut start = base.clone();
    start.extend_from_slice(lower);
    let end = match upper {
        Some(u) => {
            let mut e = base.clone();
            e.extend_from_slice(u);
            Some(e)
        }
        None => prefix_end(&base),
    };
    let upper_bound = match &end {
        Some(e) => Bound::Excluded(e.as_slice()),
        None => Bound::Unbounded,
    };
    let inner = store.range(Bound::Included(start.as_slice()), upper_bound)?;
    Ok(RecordIter {
        store,
        inner,
        base_len: base.len(),
        via_index: scope != Scope::Primary,
        _marker: PhantomData,
    })
}

/// Scans every row whose scope-relative key starts with `key_prefix`.
pub fn scan_prefix<'a, R: Record>(
    store: &'a dyn KvStore,
    scope: Scope,
    key_prefix: &[u8],
) -> StoreResult<RecordIter<'a, R>> {
    let end = prefix_end(key_prefix);
    scan(store, scope, key_prefix, end.as_deref())
}

/// Collects every row under `key_prefix`.
pub fn collect_prefix<R: Record>(
    store: &dyn KvStore,
    scope: Scope,
    key_prefix: &[u8],
) -> StoreResult<Vec<R>> {
    scan_prefix::<R>(store, scope, key_prefix)?
        .map(|r| r.map(|(_, rec)| rec))
        .collect()
}

/// One page of rows under `key_prefix`, resuming from `page.key` if set.
pub fn list<R: Record>(
    store: &dyn KvStore,
    scope: Scope,
    key_prefix: &[u8],
    page: &PageRequest,
    limits: &PaginationConfig,
) -> StoreResult<(Vec<R>, PageResponse)> {
    let limit = page.effective_limit(limits);
    let lower = match &page.key {
        Some(cursor) if cursor.as_slice() > key_prefix => cursor.as_slice(),
        _ => key_prefix,
    };
    let end = prefix_end(key_prefix);

    let mut items = Vec::with_capacity(limit.min(64));
    let mut next_key = None;
    for entry in scan::<R>(store, scope, lower, end.as_deref())? {
        let (cursor, record) = entry?;
        if items.len() == limit {
            next_key = Some(cursor);
            break;
        }
        items.push(record);
    }

    let total = if page.count_total && page.key.is_none() {
        let mut count = 0u64;
        for entry in scan::<R>(store, scope, key_prefix, end.as_deref())? {
            entry?;
            count += 1;
        }
        Some(count)
    } else {
        None
    };

    Ok((items, PageResponse { next_key, total }))
}
