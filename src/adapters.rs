//! Map-like and iterator-like facades over the query surface
//!
//! Thin views with no semantics of their own: `SeqMap` gives the index a
//! dictionary feel for callers that think in lookups, `RecordStream` walks
//! every record once. Both delegate to [`SeqDb`](crate::SeqDb).

use crate::error::{Result, SeqDbError};
use crate::engine::SeqDb;
use std::collections::VecDeque;

/// Single-shot iterator over `(id, payload)` pairs
///
/// The id list is snapshotted when the stream is created; each step performs
/// one full-record extraction through the handle cache.
pub struct RecordStream<'a> {
    db: &'a mut SeqDb,
    ids: VecDeque<String>,
}

impl<'a> RecordStream<'a> {
    pub(crate) fn new(db: &'a mut SeqDb, ids: VecDeque<String>) -> Self {
        Self { db, ids }
    }
}

impl Iterator for RecordStream<'_> {
    type Item = Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.pop_front()?;
        match self.db.subseq_range(&id, None, None) {
            Ok(segment) => Some(Ok((id, segment.bytes))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read-only map facade over the index
///
/// Lookups return whole-record payloads. The mutating half of the map
/// vocabulary exists but always fails with
/// [`ReadOnly`](crate::SeqDbError::ReadOnly): the engine never mutates
/// indexed files.
pub struct SeqMap<'a> {
    db: &'a mut SeqDb,
}

impl<'a> SeqMap<'a> {
    pub(crate) fn new(db: &'a mut SeqDb) -> Self {
        Self { db }
    }

    /// Whole-record payload for an id, `None` when absent
    pub fn get(&mut self, id: &str) -> Result<Option<Vec<u8>>> {
        if !self.db.contains(id) {
            return Ok(None);
        }
        Ok(Some(self.db.subseq_range(id, None, None)?.bytes))
    }

    /// Check whether an id is indexed
    pub fn contains_key(&self, id: &str) -> bool {
        self.db.contains(id)
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Check whether the map holds no records
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// All record identifiers in store order
    pub fn keys(&self) -> Vec<String> {
        self.db.ids().collect()
    }

    /// Always fails: the index is read-only
    pub fn insert(&mut self, _id: &str, _payload: &[u8]) -> Result<()> {
        Err(SeqDbError::ReadOnly)
    }

    /// Always fails: the index is read-only
    pub fn remove(&mut self, _id: &str) -> Result<()> {
        Err(SeqDbError::ReadOnly)
    }
}
