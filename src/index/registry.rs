//! File registry: small integer file numbers for descriptor packing
//!
//! Descriptors carry an 8-bit `file_no` instead of a path. The registry owns
//! the bijection between numbers and absolute paths for one engine instance
//! (never process-global), persists it under `__file_<n>__` meta-keys, and
//! rebuilds it when an index is reopened. Because the engine registers its
//! source files in sorted order, numbers stay stable across rebuilds of the
//! same file set.

use crate::error::{Result, SeqDbError};
use crate::index::store::{file_key, Store};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Engine-owned bijection `file_no <-> absolute path`
#[derive(Debug, Default)]
pub struct FileRegistry {
    paths: Vec<PathBuf>,
    numbers: HashMap<PathBuf, u8>,
}

impl FileRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path, assigning the next free number on first sight
    ///
    /// Returns the existing number if the path is already registered. At
    /// most 256 files fit the 8-bit descriptor field.
    pub fn register(&mut self, path: &Path) -> Result<u8> {
        if let Some(&file_no) = self.numbers.get(path) {
            return Ok(file_no);
        }
        let next = self.paths.len();
        let file_no = u8::try_from(next).map_err(|_| SeqDbError::PathInvalid {
            msg: format!("more than 256 source files (registering {})", path.display()),
        })?;
        self.paths.push(path.to_path_buf());
        self.numbers.insert(path.to_path_buf(), file_no);
        Ok(file_no)
    }

    /// Path registered under a number
    pub fn path_of(&self, file_no: u8) -> Option<&Path> {
        self.paths.get(usize::from(file_no)).map(PathBuf::as_path)
    }

    /// Number registered for a path
    pub fn number_of(&self, path: &Path) -> Option<u8> {
        self.numbers.get(path).copied()
    }

    /// Number of registered files
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check whether no files are registered
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Write the registry into the store as `__file_<n>__` meta-keys
    pub fn persist(&self, store: &mut Store) -> Result<()> {
        for (n, path) in self.paths.iter().enumerate() {
            let key = file_key(n as u8);
            store.put(&key, path.to_string_lossy().as_bytes())?;
        }
        Ok(())
    }

    /// Rebuild the registry from a reopened store's meta-keys
    pub fn restore(store: &Store) -> Result<Self> {
        let mut registry = Self::new();
        for n in 0..=u8::MAX {
            match store.get(&file_key(n)) {
                Some(raw) => {
                    let path = PathBuf::from(String::from_utf8_lossy(raw).into_owned());
                    registry.paths.push(path.clone());
                    registry.numbers.insert(path, n);
                }
                None => break,
            }
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::store::StoreMode;
    use tempfile::TempDir;

    #[test]
    fn test_register_assigns_sequential_numbers() {
        let mut registry = FileRegistry::new();
        assert_eq!(registry.register(Path::new("/data/a.fa")).unwrap(), 0);
        assert_eq!(registry.register(Path::new("/data/b.fa")).unwrap(), 1);
        // Re-registration returns the existing number
        assert_eq!(registry.register(Path::new("/data/a.fa")).unwrap(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bijection() {
        let mut registry = FileRegistry::new();
        let n = registry.register(Path::new("/data/a.fa")).unwrap();
        assert_eq!(registry.path_of(n), Some(Path::new("/data/a.fa")));
        assert_eq!(registry.number_of(Path::new("/data/a.fa")), Some(n));
        assert_eq!(registry.path_of(200), None);
        assert_eq!(registry.number_of(Path::new("/data/missing.fa")), None);
    }

    #[test]
    fn test_persist_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");

        let mut registry = FileRegistry::new();
        registry.register(Path::new("/data/a.fa")).unwrap();
        registry.register(Path::new("/data/b.fa")).unwrap();

        let mut store = Store::open(&path, StoreMode::CreateRw).unwrap();
        registry.persist(&mut store).unwrap();
        store.close().unwrap();

        let store = Store::open(&path, StoreMode::Read).unwrap();
        let restored = FileRegistry::restore(&store).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.path_of(0), Some(Path::new("/data/a.fa")));
        assert_eq!(restored.path_of(1), Some(Path::new("/data/b.fa")));
        assert_eq!(restored.number_of(Path::new("/data/b.fa")), Some(1));
    }
}
