//! Persistent key-value store backing the index
//!
//! A single-file binary map from opaque keys (record identifiers) to opaque
//! values (packed descriptors). The whole store is resident in memory while
//! open and is rewritten atomically on flush, so readers never observe a
//! half-written index.
//!
//! # File Layout
//!
//! ```text
//! magic "SQDX" (4 bytes)
//! version u8 (currently 1)
//! entry count u32 (big-endian)
//! per entry:
//!   key_len u16 (big-endian) | key bytes | val_len u16 (big-endian) | val bytes
//! ```
//!
//! Entries iterate in insertion order; re-putting an existing key keeps its
//! position. A handful of reserved meta-keys (`__codec__`, `__file_<n>__`,
//! `__sentinel__`) live alongside record keys and are filtered out of the
//! public id iteration by [`is_meta_key`].

use crate::error::{Result, SeqDbError};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"SQDX";
const VERSION: u8 = 1;

/// Meta-key recording the descriptor codec variant (`"32"` or `"64"`)
pub const CODEC_KEY: &[u8] = b"__codec__";

/// Meta-key present only while an indexing pass is running
pub const SENTINEL_KEY: &[u8] = b"__sentinel__";

/// Value stored under [`SENTINEL_KEY`] during indexing
pub const SENTINEL_IN_PROGRESS: &[u8] = b"in_progress";

/// Meta-key mapping a registered file number to its absolute path
pub fn file_key(file_no: u8) -> Vec<u8> {
    format!("__file_{}__", file_no).into_bytes()
}

/// Reserved-key test: meta-keys are excluded from id iteration
pub fn is_meta_key(key: &[u8]) -> bool {
    key.len() > 4 && key.starts_with(b"__") && key.ends_with(b"__")
}

/// Open mode for the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Shared read-only access; `put` fails with `ReadOnly`
    Read,
    /// Exclusive read-write access; creates the file on first flush
    CreateRw,
}

/// On-disk key-value store, fully resident while open
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    mode: StoreMode,
    entries: HashMap<Vec<u8>, Vec<u8>>,
    key_order: Vec<Vec<u8>>,
}

impl Store {
    /// Open a store at `path`
    ///
    /// In `Read` mode a missing or malformed file fails with
    /// `IndexUnavailable`. In `CreateRw` mode a missing file starts an empty
    /// store; an existing file is loaded so partial rebuilds keep untouched
    /// entries.
    pub fn open<P: AsRef<Path>>(path: P, mode: StoreMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = Store {
            path,
            mode,
            entries: HashMap::new(),
            key_order: Vec::new(),
        };

        match File::open(&store.path) {
            Ok(mut file) => store.load(&mut file)?,
            Err(e) => {
                if mode == StoreMode::Read {
                    return Err(SeqDbError::IndexUnavailable {
                        msg: format!("cannot open {}: {}", store.path.display(), e),
                    });
                }
            }
        }

        Ok(store)
    }

    fn load(&mut self, file: &mut File) -> Result<()> {
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        let mut cursor = 0usize;
        let header = self.take(&raw, &mut cursor, 9)?;
        if &header[0..4] != MAGIC {
            return Err(self.malformed("bad magic"));
        }
        if header[4] != VERSION {
            return Err(self.malformed(&format!("unsupported version {}", header[4])));
        }
        let count = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);

        for _ in 0..count {
            let len = self.take(&raw, &mut cursor, 2)?;
            let key_len = usize::from(u16::from_be_bytes([len[0], len[1]]));
            let key = self.take(&raw, &mut cursor, key_len)?.to_vec();

            let len = self.take(&raw, &mut cursor, 2)?;
            let val_len = usize::from(u16::from_be_bytes([len[0], len[1]]));
            let val = self.take(&raw, &mut cursor, val_len)?.to_vec();

            if self.entries.insert(key.clone(), val).is_none() {
                self.key_order.push(key);
            }
        }

        Ok(())
    }

    fn take<'a>(&self, raw: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
        let end = *cursor + len;
        if end > raw.len() {
            return Err(self.malformed("truncated store file"));
        }
        let slice = &raw[*cursor..end];
        *cursor = end;
        Ok(slice)
    }

    fn malformed(&self, what: &str) -> SeqDbError {
        SeqDbError::IndexUnavailable {
            msg: format!("{}: {}", self.path.display(), what),
        }
    }

    /// Look up a value by key
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite a key; only valid in `CreateRw` mode
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.mode == StoreMode::Read {
            return Err(SeqDbError::ReadOnly);
        }
        if key.len() > usize::from(u16::MAX) || value.len() > usize::from(u16::MAX) {
            return Err(SeqDbError::IndexUnavailable {
                msg: format!("key or value exceeds {} bytes", u16::MAX),
            });
        }
        if self.entries.insert(key.to_vec(), value.to_vec()).is_none() {
            self.key_order.push(key.to_vec());
        }
        Ok(())
    }

    /// Remove a key; only valid in `CreateRw` mode
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.mode == StoreMode::Read {
            return Err(SeqDbError::ReadOnly);
        }
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.key_order.retain(|k| k != key);
        }
        Ok(removed)
    }

    /// Iterate keys in insertion order; restartable
    pub fn iter_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.key_order.iter().map(Vec::as_slice)
    }

    /// Number of entries, meta-keys included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store to disk atomically (temp file + rename)
    ///
    /// No-op in `Read` mode.
    pub fn flush(&mut self) -> Result<()> {
        if self.mode == StoreMode::Read {
            return Ok(());
        }

        let count = u32::try_from(self.key_order.len()).map_err(|_| SeqDbError::IndexUnavailable {
            msg: format!("too many entries to persist: {}", self.key_order.len()),
        })?;

        let tmp = self.path.with_extension("index.tmp");
        {
            let mut out = File::create(&tmp)?;
            out.write_all(MAGIC)?;
            out.write_all(&[VERSION])?;
            out.write_all(&count.to_be_bytes())?;
            for key in &self.key_order {
                if let Some(value) = self.entries.get(key) {
                    out.write_all(&(key.len() as u16).to_be_bytes())?;
                    out.write_all(key)?;
                    out.write_all(&(value.len() as u16).to_be_bytes())?;
                    out.write_all(value)?;
                }
            }
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Flush and drop the store
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    /// Drop the store and delete its backing file
    pub fn unlink(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SeqDbError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_put_get_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");

        let mut store = Store::open(&path, StoreMode::CreateRw).unwrap();
        store.put(b"chr1", b"descriptor-one").unwrap();
        store.put(b"chr2", b"descriptor-two").unwrap();
        store.close().unwrap();

        let store = Store::open(&path, StoreMode::Read).unwrap();
        assert_eq!(store.get(b"chr1"), Some(&b"descriptor-one"[..]));
        assert_eq!(store.get(b"chr2"), Some(&b"descriptor-two"[..]));
        assert_eq!(store.get(b"chr3"), None);
    }

    #[test]
    fn test_read_mode_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Store::open(dir.path().join("absent.index"), StoreMode::Read);
        assert!(matches!(
            result,
            Err(SeqDbError::IndexUnavailable { .. })
        ));
    }

    #[test]
    fn test_read_mode_rejects_put() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");
        Store::open(&path, StoreMode::CreateRw)
            .unwrap()
            .close()
            .unwrap();

        let mut store = Store::open(&path, StoreMode::Read).unwrap();
        assert!(matches!(
            store.put(b"k", b"v"),
            Err(SeqDbError::ReadOnly)
        ));
    }

    #[test]
    fn test_iteration_order_is_insertion_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");

        let mut store = Store::open(&path, StoreMode::CreateRw).unwrap();
        store.put(b"zebra", b"1").unwrap();
        store.put(b"apple", b"2").unwrap();
        store.put(b"mango", b"3").unwrap();
        // Overwrite keeps position
        store.put(b"zebra", b"4").unwrap();
        store.close().unwrap();

        let store = Store::open(&path, StoreMode::Read).unwrap();
        let keys: Vec<&[u8]> = store.iter_keys().collect();
        assert_eq!(keys, vec![&b"zebra"[..], &b"apple"[..], &b"mango"[..]]);
        assert_eq!(store.get(b"zebra"), Some(&b"4"[..]));
    }

    #[test]
    fn test_remove_drops_key_from_iteration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");

        let mut store = Store::open(&path, StoreMode::CreateRw).unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        assert_eq!(store.remove(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.remove(b"a").unwrap(), None);
        let keys: Vec<&[u8]> = store.iter_keys().collect();
        assert_eq!(keys, vec![&b"b"[..]]);
    }

    #[test]
    fn test_malformed_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.index");
        fs::write(&path, b"NOPE\x01\x00\x00\x00\x00").unwrap();

        assert!(matches!(
            Store::open(&path, StoreMode::Read),
            Err(SeqDbError::IndexUnavailable { .. })
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.index");
        fs::write(&path, b"SQDX\x01\x00\x00\x00\x02\x00\x04ab").unwrap();

        assert!(matches!(
            Store::open(&path, StoreMode::Read),
            Err(SeqDbError::IndexUnavailable { .. })
        ));
    }

    #[test]
    fn test_meta_key_predicate() {
        assert!(is_meta_key(b"__codec__"));
        assert!(is_meta_key(b"__file_0__"));
        assert!(is_meta_key(b"__sentinel__"));
        assert!(!is_meta_key(b"chr1"));
        assert!(!is_meta_key(b"__"));
        assert!(!is_meta_key(b"chr__1"));
    }

    #[test]
    fn test_unlink_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.index");
        let mut store = Store::open(&path, StoreMode::CreateRw).unwrap();
        store.put(b"k", b"v").unwrap();
        store.flush().unwrap();
        assert!(path.exists());

        let store = Store::open(&path, StoreMode::CreateRw).unwrap();
        store.unlink().unwrap();
        assert!(!path.exists());
    }
}
