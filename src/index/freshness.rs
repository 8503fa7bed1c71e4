//! Freshness controller: decide between reuse, partial rebuild, full rebuild
//!
//! On every open the controller compares source-file modification times
//! against the index file's own mtime and rescans only what changed. An
//! `__sentinel__` meta-key bridges crashes: it is flushed to disk before the
//! first record is scanned and removed after the last, so an index file that
//! still carries it was written by an interrupted pass and is discarded.
//!
//! Stale entries for records that have *disappeared* from a source file are
//! not detected; they remain until a forced rebuild. This is the documented
//! trade-off for never rescanning unchanged files.

use crate::error::{Result, SeqDbError};
use crate::index::builder::{GeometryPolicy, Indexer};
use crate::index::descriptor::Codec;
use crate::index::registry::FileRegistry;
use crate::index::store::{Store, StoreMode, CODEC_KEY, SENTINEL_IN_PROGRESS, SENTINEL_KEY};
use crate::scan::RecordScanner;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Open or (re)build the index for a set of source files
///
/// `sources` must be nonempty, absolute, and sorted; registration order
/// follows it, which keeps file numbers stable across rebuilds. Returns the
/// store reopened read-only, the restored registry, and the codec in force.
pub fn prepare(
    index_path: &Path,
    sources: &[PathBuf],
    scanner: &dyn RecordScanner,
    policy: GeometryPolicy,
    force_reindex: bool,
    debug_mode: bool,
) -> Result<(Store, FileRegistry, Codec)> {
    let max_file_size = sources
        .iter()
        .map(|p| fs::metadata(p).map(|m| m.len()))
        .collect::<std::io::Result<Vec<u64>>>()?
        .into_iter()
        .max()
        .unwrap_or(0);
    let needed_codec = Codec::for_max_file_size(max_file_size);

    if force_reindex {
        remove_index(index_path)?;
    }

    // Inspect whatever is on disk. A sentinel, a missing codec tag, a codec
    // too narrow for the current file set, or a file that fails to parse all
    // mean the index cannot be trusted and is discarded.
    let mut existing_codec: Option<Codec> = None;
    let mut index_mtime: Option<SystemTime> = None;
    let mut prior_registry = FileRegistry::new();

    if index_path.exists() {
        match Store::open(index_path, StoreMode::Read) {
            Ok(store) => {
                if store.get(SENTINEL_KEY).is_some() {
                    warn!(
                        index = %index_path.display(),
                        "index left by an interrupted pass, rebuilding"
                    );
                    store.unlink()?;
                } else {
                    match store.get(CODEC_KEY).map(Codec::from_tag) {
                        Some(Ok(codec)) if codec == Codec::Bits32 && needed_codec == Codec::Bits64 => {
                            warn!(
                                index = %index_path.display(),
                                "source files outgrew the 32-bit index, rebuilding with 64-bit offsets"
                            );
                            store.unlink()?;
                        }
                        Some(Ok(codec)) => {
                            existing_codec = Some(codec);
                            index_mtime = Some(fs::metadata(index_path)?.modified()?);
                            prior_registry = FileRegistry::restore(&store)?;
                        }
                        _ => {
                            warn!(
                                index = %index_path.display(),
                                "index carries no usable codec tag, rebuilding"
                            );
                            store.unlink()?;
                        }
                    }
                }
            }
            Err(_) => {
                warn!(index = %index_path.display(), "malformed index, rebuilding");
                remove_index(index_path)?;
            }
        }
    }

    // A file is rescanned when it is newer than the index or the index has
    // never seen it.
    let updated: Vec<PathBuf> = match index_mtime {
        None => sources.to_vec(),
        Some(threshold) => sources
            .iter()
            .filter(|path| {
                prior_registry.number_of(path).is_none() || newer_than(path, threshold)
            })
            .cloned()
            .collect(),
    };

    if let (Some(codec), true) = (existing_codec, updated.is_empty()) {
        debug!(index = %index_path.display(), "index is fresh");
        let store = Store::open(index_path, StoreMode::Read)?;
        let registry = FileRegistry::restore(&store)?;
        return Ok((store, registry, codec));
    }

    let codec = existing_codec.unwrap_or(needed_codec);
    debug!(
        index = %index_path.display(),
        files = updated.len(),
        "indexing updated source files"
    );

    match build(
        index_path, sources, &updated, scanner, codec, policy, debug_mode,
    ) {
        Ok(()) => {}
        Err(e) => {
            // An aborted pass must not leave a half-built index behind.
            remove_index(index_path)?;
            return Err(e);
        }
    }

    let store = Store::open(index_path, StoreMode::Read)?;
    let registry = FileRegistry::restore(&store)?;
    Ok((store, registry, codec))
}

fn build(
    index_path: &Path,
    sources: &[PathBuf],
    updated: &[PathBuf],
    scanner: &dyn RecordScanner,
    codec: Codec,
    policy: GeometryPolicy,
    debug_mode: bool,
) -> Result<()> {
    let mut store = Store::open(index_path, StoreMode::CreateRw)?;

    let mut registry = FileRegistry::restore(&store)?;
    for path in sources {
        registry.register(path)?;
    }
    registry.persist(&mut store)?;
    store.put(CODEC_KEY, codec.tag())?;

    // The sentinel must reach disk before the first record does.
    store.put(SENTINEL_KEY, SENTINEL_IN_PROGRESS)?;
    store.flush()?;

    let indexer = Indexer::new(scanner, codec, policy, debug_mode);
    for path in updated {
        indexer.index_file(&mut store, &registry, path)?;
    }

    store.remove(SENTINEL_KEY)?;
    store.close()
}

fn newer_than(path: &Path, threshold: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|mtime| mtime > threshold)
        .unwrap_or(true)
}

fn remove_index(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SeqDbError::Io(e)),
    }
}
