//! The engine: open options, index lifecycle, and the query surface
//!
//! `SeqDb` ties the subsystems together. Opening stats the sources, lets the
//! freshness controller decide what to (re)index, and ends with the store
//! reopened read-only. Queries look up a descriptor, translate coordinates,
//! and read through the file-handle cache.
//!
//! # Example
//!
//! ```no_run
//! use seqdb::SeqDb;
//!
//! # fn main() -> seqdb::Result<()> {
//! let mut db = SeqDb::open("genome.fa")?;
//!
//! println!("{} records", db.len());
//! let segment = db.subseq("chr1:5,12")?;
//! println!("chr1:5-12 = {}", String::from_utf8_lossy(&segment.bytes));
//! # Ok(())
//! # }
//! ```

use crate::adapters::{RecordStream, SeqMap};
use crate::error::{Result, SeqDbError};
use crate::fetch::coords;
use crate::fetch::handles::{HandleCache, DEFAULT_MAX_OPEN};
use crate::index::builder::GeometryPolicy;
use crate::index::descriptor::{Codec, RecordDescriptor};
use crate::index::freshness;
use crate::index::registry::FileRegistry;
use crate::index::store::{is_meta_key, Store};
use crate::scan::{FastaScanner, RecordScanner};
use crate::types::Segment;
use md5::{Digest, Md5};
use regex::Regex;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the caller pointed the engine at
enum Source {
    /// A single file or a directory; decided by a stat at open time
    Path(PathBuf),
    /// An explicit list of files
    List(Vec<PathBuf>),
}

/// Configuration for opening a [`SeqDb`]
///
/// Every option has a default; `open` consumes the builder.
pub struct SeqDbBuilder {
    source: Source,
    glob: String,
    max_open: usize,
    reindex: bool,
    index_name: Option<PathBuf>,
    clean: bool,
    debug: bool,
    scanner: Box<dyn RecordScanner>,
    policy: GeometryPolicy,
}

impl SeqDbBuilder {
    /// Start from a single file or a directory of files
    pub fn from_path<P: AsRef<Path>>(source: P) -> Self {
        Self::new(Source::Path(source.as_ref().to_path_buf()))
    }

    /// Start from an explicit list of files
    pub fn from_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::new(Source::List(
            files.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
        ))
    }

    fn new(source: Source) -> Self {
        Self {
            source,
            glob: "*".to_string(),
            max_open: DEFAULT_MAX_OPEN,
            reindex: false,
            index_name: None,
            clean: false,
            debug: false,
            scanner: Box::new(FastaScanner::new()),
            policy: GeometryPolicy::Strict,
        }
    }

    /// Filename pattern for directory sources (`*` and `?` wildcards)
    pub fn glob<S: Into<String>>(mut self, glob: S) -> Self {
        self.glob = glob.into();
        self
    }

    /// Capacity of the file-handle cache
    pub fn max_open(mut self, max_open: usize) -> Self {
        self.max_open = max_open;
        self
    }

    /// Discard any existing index and rebuild from scratch
    pub fn reindex(mut self, reindex: bool) -> Self {
        self.reindex = reindex;
        self
    }

    /// Override the index file location
    pub fn index_name<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.index_name = Some(path.as_ref().to_path_buf());
        self
    }

    /// Delete the index file when the engine is dropped
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Emit per-record progress and duplicate-identifier warnings
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the record scanner (sentinel, id extraction, classification)
    pub fn scanner<S: RecordScanner + 'static>(mut self, scanner: S) -> Self {
        self.scanner = Box::new(scanner);
        self
    }

    /// Log line-geometry violations instead of failing the indexing pass
    ///
    /// Records indexed under a violated geometry may extract garbage.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.policy = if lenient {
            GeometryPolicy::Lenient
        } else {
            GeometryPolicy::Strict
        };
        self
    }

    /// Resolve sources, refresh the index as needed, and open the engine
    pub fn open(self) -> Result<SeqDb> {
        let sources = self.resolve_sources()?;
        let index_path = match &self.index_name {
            Some(path) => path.clone(),
            None => self.default_index_path(&sources)?,
        };
        debug!(
            index = %index_path.display(),
            files = sources.len(),
            "opening engine"
        );

        let (store, registry, codec) = freshness::prepare(
            &index_path,
            &sources,
            self.scanner.as_ref(),
            self.policy,
            self.reindex,
            self.debug,
        )?;

        Ok(SeqDb {
            store,
            registry,
            codec,
            handles: HandleCache::new(self.max_open),
            index_path,
            clean: self.clean,
        })
    }

    /// Turn the configured source into a sorted, deduplicated list of
    /// absolute file paths
    fn resolve_sources(&self) -> Result<Vec<PathBuf>> {
        let mut sources = match &self.source {
            Source::Path(path) => {
                let meta = fs::metadata(path).map_err(|e| SeqDbError::PathInvalid {
                    msg: format!("{}: {}", path.display(), e),
                })?;
                if meta.is_dir() {
                    self.matching_files(path)?
                } else if meta.is_file() {
                    vec![fs::canonicalize(path)?]
                } else {
                    return Err(SeqDbError::PathInvalid {
                        msg: format!("{} is neither a file nor a directory", path.display()),
                    });
                }
            }
            Source::List(files) => {
                if files.is_empty() {
                    return Err(SeqDbError::PathInvalid {
                        msg: "empty file list".to_string(),
                    });
                }
                let mut resolved = Vec::with_capacity(files.len());
                for path in files {
                    let meta = fs::metadata(path).map_err(|e| SeqDbError::PathInvalid {
                        msg: format!("{}: {}", path.display(), e),
                    })?;
                    if !meta.is_file() {
                        return Err(SeqDbError::PathInvalid {
                            msg: format!("{} is not a file", path.display()),
                        });
                    }
                    resolved.push(fs::canonicalize(path)?);
                }
                resolved
            }
        };

        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    fn matching_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let matcher = glob_to_regex(&self.glob)?;
        // The engine's own artifacts live inside the scanned directory
        // (`directory.index` by default) and the default `*` glob matches
        // them on every reopen. They are never sources.
        let custom_index = self
            .index_name
            .as_deref()
            .and_then(Path::file_name)
            .map(OsStr::to_os_string);
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if is_index_artifact(&name) || Some(&name) == custom_index.as_ref() {
                continue;
            }
            if matcher.is_match(&name.to_string_lossy()) {
                files.push(fs::canonicalize(entry.path())?);
            }
        }
        if files.is_empty() {
            return Err(SeqDbError::NoMatchingFiles {
                dir: dir.to_path_buf(),
                glob: self.glob.clone(),
            });
        }
        Ok(files)
    }

    /// Default index naming: `<file>.index`, `<dir>/directory.index`, or
    /// `fileset_<md5>.index` in the working directory for explicit lists
    fn default_index_path(&self, sources: &[PathBuf]) -> Result<PathBuf> {
        match &self.source {
            Source::Path(path) => {
                let meta = fs::metadata(path)?;
                if meta.is_dir() {
                    Ok(path.join("directory.index"))
                } else {
                    let mut name = fs::canonicalize(path)?.into_os_string();
                    name.push(".index");
                    Ok(PathBuf::from(name))
                }
            }
            Source::List(_) => {
                let mut hasher = Md5::new();
                for path in sources {
                    hasher.update(path.to_string_lossy().as_bytes());
                    hasher.update(b"\n");
                }
                let digest = hasher.finalize();
                let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
                Ok(PathBuf::from(format!("fileset_{}.index", hex)))
            }
        }
    }
}

/// Index files the engine itself writes (including the flush temp file)
fn is_index_artifact(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.ends_with(".index") || name.ends_with(".index.tmp")
}

/// Translate a `*`/`?` filename glob into an anchored regex
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| SeqDbError::PathInvalid {
        msg: format!("bad glob '{}': {}", glob, e),
    })
}

/// Indexed random-access engine over one or more sequence files
///
/// Query methods take `&mut self`: the file-handle cache updates recency on
/// every read. The engine is single-threaded by design; wrap it for shared
/// use.
pub struct SeqDb {
    store: Store,
    registry: FileRegistry,
    codec: Codec,
    handles: HandleCache,
    index_path: PathBuf,
    clean: bool,
}

impl SeqDb {
    /// Open a file or directory with default options
    pub fn open<P: AsRef<Path>>(source: P) -> Result<Self> {
        SeqDbBuilder::from_path(source).open()
    }

    /// Builder for a file or directory source
    pub fn builder<P: AsRef<Path>>(source: P) -> SeqDbBuilder {
        SeqDbBuilder::from_path(source)
    }

    /// Iterate record identifiers in the store's order; restartable
    pub fn ids(&self) -> impl Iterator<Item = String> + '_ {
        self.store
            .iter_keys()
            .filter(|key| !is_meta_key(key))
            .map(|key| String::from_utf8_lossy(key).into_owned())
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.store.iter_keys().filter(|key| !is_meta_key(key)).count()
    }

    /// Check whether the index holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether an identifier is indexed (verbatim, no range grammar)
    pub fn contains(&self, id: &str) -> bool {
        !is_meta_key(id.as_bytes()) && self.store.contains(id.as_bytes())
    }

    /// Payload length of a record in bytes
    pub fn length(&self, id: &str) -> Result<u64> {
        Ok(self.descriptor(id)?.seq_length)
    }

    /// Source file containing a record
    pub fn path(&self, id: &str) -> Result<&Path> {
        let d = self.descriptor(id)?;
        self.registry
            .path_of(d.file_no)
            .ok_or_else(|| SeqDbError::IndexUnavailable {
                msg: format!("registry has no file number {}", d.file_no),
            })
    }

    /// The descriptor stored for an identifier
    pub fn descriptor(&self, id: &str) -> Result<RecordDescriptor> {
        if is_meta_key(id.as_bytes()) {
            return Err(SeqDbError::UnknownId(id.to_string()));
        }
        match self.store.get(id.as_bytes()) {
            Some(packed) => self.codec.unpack(packed),
            None => Err(SeqDbError::UnknownId(id.to_string())),
        }
    }

    /// Extract payload bytes by query string
    ///
    /// With no inline range the whole record is returned. If the query does
    /// not match the index verbatim, the compound grammar
    /// `<id>:<start><sep><stop>` is tried (`,`, `-` or `..`; `_` digit
    /// grouping allowed). Reversed bounds select the same bytes and mark the
    /// segment reverse-strand.
    pub fn subseq(&mut self, query: &str) -> Result<Segment> {
        if self.contains(query) {
            return self.subseq_range(query, None, None);
        }
        if let Some((core_id, a, b)) = coords::parse_compound(query) {
            if self.contains(&core_id) {
                return self.subseq_range(&core_id, Some(a), Some(b));
            }
        }
        Err(SeqDbError::UnknownId(query.to_string()))
    }

    /// Extract payload bytes with explicit optional bounds (1-based,
    /// inclusive)
    ///
    /// A missing start defaults to 1, a missing stop to the record length.
    pub fn subseq_range(
        &mut self,
        id: &str,
        start: Option<u64>,
        stop: Option<u64>,
    ) -> Result<Segment> {
        let d = self.descriptor(id)?;
        let (start, stop, strand) = coords::resolve_range(d.seq_length, start, stop);

        let bytes = if stop < start {
            Vec::new()
        } else {
            let path = self
                .registry
                .path_of(d.file_no)
                .ok_or_else(|| SeqDbError::IndexUnavailable {
                    msg: format!("registry has no file number {}", d.file_no),
                })?
                .to_path_buf();
            let file = self.handles.acquire(&path)?;
            coords::read_span(file, &d, start, stop)?
        };

        Ok(Segment {
            id: id.to_string(),
            start,
            stop,
            strand,
            bytes,
        })
    }

    /// Single-shot iterator over `(id, payload)` pairs in store order
    pub fn stream(&mut self) -> RecordStream<'_> {
        let ids: VecDeque<String> = self.ids().collect();
        RecordStream::new(self, ids)
    }

    /// Read-only map facade over the index
    pub fn as_map(&mut self) -> SeqMap<'_> {
        SeqMap::new(self)
    }

    /// Location of the index file
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Codec variant the index was built with
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Number of source files behind the index
    pub fn file_count(&self) -> usize {
        self.registry.len()
    }

    /// Currently open file handles in the cache
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for SeqDb {
    fn drop(&mut self) {
        if self.clean {
            let _ = fs::remove_file(&self.index_path);
        }
    }
}
