//! Error types for seqdb

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for seqdb operations
pub type Result<T> = std::result::Result<T, SeqDbError>;

/// Error types that can occur in seqdb
#[derive(Debug, Error)]
pub enum SeqDbError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source argument is neither a file, a directory, nor a nonempty list
    #[error("Invalid source path: {msg}")]
    PathInvalid {
        /// What was wrong with the source
        msg: String,
    },

    /// Directory contains no files matching the glob
    #[error("No files matching '{glob}' in {dir}")]
    NoMatchingFiles {
        /// Directory that was searched
        dir: PathBuf,
        /// Glob pattern that matched nothing
        glob: String,
    },

    /// Persistent index store cannot be opened or is malformed
    #[error("Index unavailable: {msg}")]
    IndexUnavailable {
        /// Why the store could not be used
        msg: String,
    },

    /// Interior content line differs from the record's line geometry
    #[error(
        "Line geometry violation in {file} at line {line}: expected {expected} bytes, found {actual}"
    )]
    LineGeometryViolation {
        /// Source file containing the record
        file: PathBuf,
        /// Line number of the offending line (1-based)
        line: usize,
        /// Expected line length in bytes
        expected: usize,
        /// Actual line length in bytes
        actual: usize,
    },

    /// Content line exceeds the 16-bit descriptor field
    #[error("Content line exceeds 65535 bytes in {file} at line {line}")]
    LineTooLong {
        /// Source file containing the record
        file: PathBuf,
        /// Line number of the offending line (1-based)
        line: usize,
    },

    /// Lookup of an identifier absent from the index
    #[error("Unknown identifier: {0}")]
    UnknownId(String),

    /// Attempt to mutate a read-only surface
    #[error("Index is read-only")]
    ReadOnly,
}
