//! File-handle cache: bounded open descriptors under random access
//!
//! Every `subseq` needs a readable handle on the record's source file.
//! Opening per query would thrash the OS; holding every file open would
//! exhaust descriptors on wide file sets. The cache keeps at most
//! `capacity` files open and, when full, evicts the least-recently-used
//! *third* in one batch, so a scattered access pattern pays the eviction
//! walk once per batch instead of once per miss.
//!
//! Single-threaded by contract (the engine serializes access); evicted and
//! dropped handles close with the `File` they wrap.

use crate::error::Result;
use lru::LruCache;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Default cache capacity (the engine's `max_open` option)
pub const DEFAULT_MAX_OPEN: usize = 32;

/// LRU-bounded map of open read-only file handles
///
/// Wraps an unbounded `LruCache` and enforces the bound itself: the crate's
/// own fixed-capacity mode evicts one entry per insert, while this cache
/// amortizes by evicting `capacity.div_ceil(3)` entries at once.
pub struct HandleCache {
    handles: LruCache<PathBuf, File>,
    capacity: usize,
}

impl HandleCache {
    /// Cache holding at most `capacity` open handles (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    /// Return an open handle for `path`, opening it on first access
    ///
    /// A hit bumps the entry's recency. A miss at capacity first evicts the
    /// least-recently-used batch, then opens and inserts.
    pub fn acquire(&mut self, path: &Path) -> Result<&mut File> {
        if !self.handles.contains(path) {
            if self.handles.len() >= self.capacity {
                self.evict_batch();
            }
            let file = File::open(path)?;
            self.handles.put(path.to_path_buf(), file);
        }
        match self.handles.get_mut(path) {
            Some(handle) => Ok(handle),
            None => Err(std::io::Error::other("handle cache lost a fresh entry").into()),
        }
    }

    fn evict_batch(&mut self) {
        let batch = self.capacity.div_ceil(3);
        for _ in 0..batch {
            if self.handles.pop_lru().is_none() {
                break;
            }
        }
    }

    /// Number of currently open handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check whether no handles are open
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Check whether a handle for `path` is open, without bumping recency
    pub fn contains(&self, path: &Path) -> bool {
        self.handles.peek(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_files(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, b"content").unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_acquire_opens_once() {
        let dir = TempDir::new().unwrap();
        let files = make_files(&dir, &["a"]);
        let mut cache = HandleCache::new(4);

        cache.acquire(&files[0]).unwrap();
        cache.acquire(&files[0]).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bound_is_never_exceeded() {
        let dir = TempDir::new().unwrap();
        let files = make_files(&dir, &["a", "b", "c", "d", "e", "f", "g", "h"]);
        let mut cache = HandleCache::new(3);

        for path in &files {
            cache.acquire(path).unwrap();
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn test_batch_eviction_size() {
        let dir = TempDir::new().unwrap();
        let files = make_files(&dir, &["a", "b", "c", "d", "e", "f", "g"]);
        // capacity 6: a full cache evicts ceil(6/3) = 2 entries at once
        let mut cache = HandleCache::new(6);

        for path in &files[..6] {
            cache.acquire(path).unwrap();
        }
        assert_eq!(cache.len(), 6);

        cache.acquire(&files[6]).unwrap();
        // 6 - 2 evicted + 1 inserted
        assert_eq!(cache.len(), 5);
        assert!(!cache.contains(&files[0]));
        assert!(!cache.contains(&files[1]));
        assert!(cache.contains(&files[2]));
        assert!(cache.contains(&files[6]));
    }

    #[test]
    fn test_lru_order_respects_recency() {
        let dir = TempDir::new().unwrap();
        let files = make_files(&dir, &["a", "b", "c", "d"]);
        let mut cache = HandleCache::new(3);

        cache.acquire(&files[0]).unwrap();
        cache.acquire(&files[1]).unwrap();
        cache.acquire(&files[2]).unwrap();
        // Touch "a" so "b" becomes the LRU
        cache.acquire(&files[0]).unwrap();

        cache.acquire(&files[3]).unwrap();
        assert!(cache.contains(&files[0]));
        assert!(!cache.contains(&files[1]));
        assert!(cache.contains(&files[2]));
        assert!(cache.contains(&files[3]));
    }

    #[test]
    fn test_eviction_scenario_four_files_capacity_three() {
        let dir = TempDir::new().unwrap();
        let files = make_files(&dir, &["a", "b", "c", "d"]);
        let mut cache = HandleCache::new(3);

        for path in &files {
            cache.acquire(path).unwrap();
        }
        // One batch of ceil(3/3) = 1 eviction: the LRU ("a") is gone,
        // the two most recent of {a, b, c} remain alongside "d".
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&files[0]));
        assert!(cache.contains(&files[1]));
        assert!(cache.contains(&files[2]));
        assert!(cache.contains(&files[3]));
    }

    #[test]
    fn test_missing_file_propagates_io_error() {
        let dir = TempDir::new().unwrap();
        let mut cache = HandleCache::new(2);
        assert!(cache.acquire(&dir.path().join("absent")).is_err());
    }
}
