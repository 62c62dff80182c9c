//! In-memory `KvStore`.
//!
//! A `BTreeMap` behind a `parking_lot::RwLock`, shared between clones so a
//! test can hand one handle to the code under test and inspect another.
//! Range reads take a snapshot of the requested span under the read lock.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{range_is_empty, KvIter, KvStore, StoreResult, WriteOp};

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.inner.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn range<'a>(&'a self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> StoreResult<KvIter<'a>> {
        if range_is_empty(lower, upper) {
            return Ok(Box::new(std::iter::empty()));
        }
        let snapshot: Vec<_> = self
            .inner
            .read()
            .range::<[u8], _>((lower, upper))
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn apply(&mut self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut map = self.inner.write();
        for op in ops {
            match op {
                WriteOp::Set(k, v) => {
                    map.insert(k, v);
                }
                WriteOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }
}
