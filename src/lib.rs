//! seqdb: indexed random access to large biological sequence files
//!
//! # Overview
//!
//! seqdb builds a persistent on-disk index over FASTA-shaped files (a header
//! line introduced by a sentinel byte, followed by uniformly wrapped content
//! lines) and then extracts arbitrary sub-ranges of any record in O(1)
//! seeks, without rereading the file.
//!
//! ## Key Pieces
//!
//! - **Indexer**: one sequential pass per file, validating line geometry and
//!   emitting a fixed-width descriptor per record
//! - **Coordinate translator**: pure arithmetic from payload position to
//!   file byte offset, honoring line wrapping and LF/CRLF terminators
//! - **Handle cache**: bounded open file descriptors with batched LRU
//!   eviction
//! - **Freshness control**: mtime-driven partial rebuilds, crash-safe via an
//!   in-progress sentinel
//!
//! ## Quick Start
//!
//! ```no_run
//! use seqdb::SeqDb;
//!
//! # fn main() -> seqdb::Result<()> {
//! // Index a file (reused on subsequent opens if unchanged)
//! let mut db = SeqDb::open("genome.fa")?;
//!
//! // Whole record
//! let chr1 = db.subseq("chr1")?;
//! println!("chr1: {} bp", chr1.len());
//!
//! // Sub-range, 1-based inclusive; also as a compound id "chr1:5,12"
//! let window = db.subseq_range("chr1", Some(5), Some(12))?;
//! println!("chr1:5-12 = {}", String::from_utf8_lossy(&window.bytes));
//! # Ok(())
//! # }
//! ```
//!
//! ## Options
//!
//! ```no_run
//! use seqdb::SeqDb;
//!
//! # fn main() -> seqdb::Result<()> {
//! let db = SeqDb::builder("genomes/")
//!     .glob("*.fa")
//!     .max_open(16)
//!     .reindex(true)
//!     .open()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`index`]: descriptor codec, persistent store, registry, indexer,
//!   freshness controller
//! - [`fetch`]: coordinate translation and the file-handle cache
//! - [`scan`]: the injected per-format scanner strategy
//! - [`adapters`]: map-like and stream-like facades

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod adapters;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod index;
pub mod scan;
pub mod types;

// Re-export commonly used types
pub use adapters::{RecordStream, SeqMap};
pub use engine::{SeqDb, SeqDbBuilder};
pub use error::{Result, SeqDbError};
pub use index::builder::GeometryPolicy;
pub use index::descriptor::{Codec, RecordDescriptor};
pub use scan::{FastaScanner, RecordScanner};
pub use types::{Segment, Strand};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
