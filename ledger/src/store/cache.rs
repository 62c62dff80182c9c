//! Transactional write cache.
//!
//! A [`CacheStore`] buffers every write made through it and serves reads
//! from the buffer first, so code running inside a transaction always sees
//! its own writes. Range reads merge the parent's ordered cursor with the
//! buffered span; buffered deletes hide the parent's rows.
//!
//! Nothing reaches the parent until [`CacheStore::commit`], which hands the
//! whole buffer over as a single `apply` batch. Dropping an uncommitted cache
//! is a rollback. Caches nest: a cache over a cache commits into the outer
//! buffer, not the backend.

use std::cmp::Ordering;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Bound;

use super::{range_is_empty, KvIter, KvPair, KvStore, StoreResult, WriteOp};

pub struct CacheStore<'p> {
    parent: &'p mut dyn KvStore,
    /// `None` marks a buffered delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'p> CacheStore<'p> {
    pub fn new(parent: &'p mut dyn KvStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Number of buffered writes (sets and deletes).
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Flushes the buffer into the parent as one atomic batch.
    pub fn commit(self) -> StoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let ops = self
            .writes
            .into_iter()
            .map(|(k, v)| match v {
                Some(v) => WriteOp::Set(k, v),
                None => WriteOp::Delete(k),
            })
            .collect();
        self.parent.apply(ops)
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn range<'a>(&'a self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> StoreResult<KvIter<'a>> {
        if range_is_empty(lower, upper) {
            return Ok(Box::new(std::iter::empty()));
        }
        let parent = self.parent.range(lower, upper)?.peekable();
        let buffered = self.writes.range::<[u8], _>((lower, upper)).peekable();
        Ok(Box::new(MergeIter { parent, buffered }))
    }

    fn apply(&mut self, ops: Vec<WriteOp>) -> StoreResult<()> {
        for op in ops {
            match op {
                WriteOp::Set(k, v) => self.writes.insert(k, Some(v)),
                WriteOp::Delete(k) => self.writes.insert(k, None),
            };
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MergeIter
// ---------------------------------------------------------------------------

enum Step {
    Parent,
    Buffered,
    /// Same key on both sides; the buffered entry shadows the parent's.
    Both,
}

struct MergeIter<'a> {
    parent: Peekable<KvIter<'a>>,
    buffered: Peekable<btree_map::Range<'a, Vec<u8>, Option<Vec<u8>>>>,
}

impl Iterator for MergeIter<'_> {
    type Item = StoreResult<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = match (self.parent.peek(), self.buffered.peek()) {
                (None, None) => return None,
                (Some(Err(_)), _) => Step::Parent,
                (Some(Ok(_)), None) => Step::Parent,
                (None, Some(_)) => Step::Buffered,
                (Some(Ok((pk, _))), Some((bk, _))) => match pk.as_slice().cmp(bk.as_slice()) {
                    Ordering::Less => Step::Parent,
                    Ordering::Greater => Step::Buffered,
                    Ordering::Equal => Step::Both,
                },
            };

            if let Step::Parent = step {
                return self.parent.next();
            }
            if let Step::Both = step {
                self.parent.next();
            }
            if let Some((key, Some(value))) = self.buffered.next() {
                return Some(Ok((key.clone(), value.clone())));
            }
            // Buffered delete: skip it and keep merging.
        }
    }
}
