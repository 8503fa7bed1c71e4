//! Indexer: one sequential pass per source file
//!
//! The indexer walks a file line by line, recognizes record boundaries
//! through the injected [`RecordScanner`], measures each record's line
//! geometry on its first content line, validates every interior line
//! against it, and emits one packed descriptor per record into the store.
//!
//! # Line Geometry
//!
//! Random access only works if a record's payload is wrapped uniformly:
//! every interior content line must have the same byte length and the same
//! terminator as the first. The final line may be shorter. Anything else is
//! a [`LineGeometryViolation`](crate::SeqDbError::LineGeometryViolation) —
//! fatal under the strict policy, logged and indexed best-effort under the
//! lenient one (extractions from such a record may return garbage).
//!
//! Because a line is only known to be interior once the next content line
//! arrives, validation runs one line behind the read position: each content
//! line first settles its predecessor, then becomes the new candidate final
//! line.

use crate::error::{Result, SeqDbError};
use crate::index::descriptor::{Codec, RecordDescriptor};
use crate::index::registry::FileRegistry;
use crate::index::store::Store;
use crate::scan::RecordScanner;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// How to treat line-geometry violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryPolicy {
    /// Violations abort the indexing pass
    #[default]
    Strict,
    /// Violations are logged; the record keeps its first line's geometry
    Lenient,
}

/// Single-pass index builder for one codec variant
pub struct Indexer<'a> {
    scanner: &'a dyn RecordScanner,
    codec: Codec,
    policy: GeometryPolicy,
    debug: bool,
}

/// Line geometry measured on a record's first content line
#[derive(Debug, Clone, Copy)]
struct LineGeometry {
    /// Full line length in bytes, terminator included
    raw_len: usize,
    /// Terminator width: 1 (LF), 2 (CRLF), 0 (unterminated final line)
    term_len: usize,
}

/// The most recent content line, not yet validated or counted
#[derive(Debug, Clone, Copy)]
struct PendingLine {
    raw_len: usize,
    term_len: usize,
    payload_len: usize,
    line_number: usize,
}

/// Accumulating state for the record currently being scanned
struct PendingRecord {
    id: Vec<u8>,
    content_offset: u64,
    geometry: Option<LineGeometry>,
    first_line_payload: Vec<u8>,
    seq_length: u64,
    last_line: Option<PendingLine>,
}

impl<'a> Indexer<'a> {
    /// Build an indexer bound to a scanner, codec and policy
    pub fn new(
        scanner: &'a dyn RecordScanner,
        codec: Codec,
        policy: GeometryPolicy,
        debug: bool,
    ) -> Self {
        Self {
            scanner,
            codec,
            policy,
            debug,
        }
    }

    /// Scan one source file and store a descriptor per record
    ///
    /// The file must already be registered. Returns the number of records
    /// emitted.
    pub fn index_file(
        &self,
        store: &mut Store,
        registry: &FileRegistry,
        path: &Path,
    ) -> Result<usize> {
        let file_no = registry
            .number_of(path)
            .ok_or_else(|| SeqDbError::PathInvalid {
                msg: format!("{} is not registered", path.display()),
            })?;
        let file_len = std::fs::metadata(path)?.len();
        let mut reader = BufReader::new(File::open(path)?);

        let mut buf: Vec<u8> = Vec::with_capacity(256);
        let mut offset = 0u64;
        let mut line_number = 0usize;
        let mut current: Option<PendingRecord> = None;
        let mut emitted = 0usize;
        let mut seen_ids: HashSet<Vec<u8>> = HashSet::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                if let Some(record) = current.take() {
                    self.emit(store, path, file_len, file_no, record, &mut seen_ids)?;
                    emitted += 1;
                }
                break;
            }
            line_number += 1;

            if self.scanner.is_header(&buf) {
                if let Some(record) = current.take() {
                    self.emit(store, path, file_len, file_no, record, &mut seen_ids)?;
                    emitted += 1;
                }
                let header = strip_terminator(&buf);
                current = Some(PendingRecord {
                    id: self.scanner.extract_id(header),
                    content_offset: offset + n as u64,
                    geometry: None,
                    first_line_payload: Vec::new(),
                    seq_length: 0,
                    last_line: None,
                });
            } else if let Some(record) = current.as_mut() {
                self.content_line(path, record, &buf, line_number)?;
            }
            // Bytes before the first header are not addressable and are skipped.

            offset += n as u64;
        }

        debug!(
            file = %path.display(),
            records = emitted,
            "indexed source file"
        );
        Ok(emitted)
    }

    fn content_line(
        &self,
        path: &Path,
        record: &mut PendingRecord,
        line: &[u8],
        line_number: usize,
    ) -> Result<()> {
        let raw_len = line.len();
        let term_len = terminator_len(line);
        let payload_len = raw_len - term_len;

        // The previous line now has a successor, so it was interior.
        if let Some(prev) = record.last_line.take() {
            if let Some(geometry) = record.geometry {
                if prev.raw_len != geometry.raw_len || prev.term_len != geometry.term_len {
                    self.geometry_violation(path, prev.line_number, geometry.raw_len, prev.raw_len)?;
                }
            }
            record.seq_length += prev.payload_len as u64;
        }

        if record.geometry.is_none() {
            if raw_len > usize::from(u16::MAX) {
                return Err(SeqDbError::LineTooLong {
                    file: path.to_path_buf(),
                    line: line_number,
                });
            }
            record.geometry = Some(LineGeometry { raw_len, term_len });
            record.first_line_payload = line[..payload_len].to_vec();
        }

        record.last_line = Some(PendingLine {
            raw_len,
            term_len,
            payload_len,
            line_number,
        });
        Ok(())
    }

    fn emit(
        &self,
        store: &mut Store,
        path: &Path,
        file_len: u64,
        file_no: u8,
        mut record: PendingRecord,
        seen_ids: &mut HashSet<Vec<u8>>,
    ) -> Result<()> {
        // Settle the final line: shorter than the interior geometry is fine,
        // longer is a violation like any other mismatch.
        if let (Some(last), Some(geometry)) = (record.last_line.take(), record.geometry) {
            if last.payload_len > geometry.raw_len - geometry.term_len {
                self.geometry_violation(path, last.line_number, geometry.raw_len, last.raw_len)?;
            }
            record.seq_length += last.payload_len as u64;
        }

        let (line_length, terminator_length) = match record.geometry {
            Some(g) => (g.raw_len as u16, g.term_len as u16),
            None => (0, 0),
        };

        let descriptor = RecordDescriptor {
            offset: record.content_offset,
            seq_length: record.seq_length,
            line_length,
            terminator_length,
            file_no,
            payload_kind: self.scanner.classify(&record.first_line_payload),
        };

        // Offset validity: the last content byte must sit inside the file.
        // Only reachable under the lenient policy, where geometry is a guess.
        if descriptor.seq_length > 0 && descriptor.payload_per_line() > 0 {
            let k = descriptor.seq_length - 1;
            let per_line = descriptor.payload_per_line();
            let last_byte = descriptor.offset
                + u64::from(descriptor.line_length) * (k / per_line)
                + (k % per_line);
            if last_byte >= file_len {
                warn!(
                    id = %String::from_utf8_lossy(&record.id),
                    file = %path.display(),
                    "descriptor extent exceeds file length, extractions may fail"
                );
            }
        }

        // A genuine collision is a second record with the same id in this
        // pass, or a stored descriptor from a different file. A record
        // merely refreshed during a partial rebuild matches neither and
        // must not warn.
        if self.debug {
            let repeated_in_pass = !seen_ids.insert(record.id.clone());
            let from_other_file = !repeated_in_pass
                && store
                    .get(&record.id)
                    .and_then(|packed| self.codec.unpack(packed).ok())
                    .map(|prior| prior.file_no != file_no)
                    .unwrap_or(false);
            if repeated_in_pass || from_other_file {
                warn!(
                    id = %String::from_utf8_lossy(&record.id),
                    file = %path.display(),
                    "duplicate identifier, later record wins"
                );
            }
        }

        let packed = self.codec.pack(&descriptor)?;
        store.put(&record.id, &packed)?;

        if self.debug {
            debug!(
                id = %String::from_utf8_lossy(&record.id),
                length = descriptor.seq_length,
                "indexed record"
            );
        }
        Ok(())
    }

    fn geometry_violation(
        &self,
        path: &Path,
        line: usize,
        expected: usize,
        actual: usize,
    ) -> Result<()> {
        match self.policy {
            GeometryPolicy::Strict => Err(SeqDbError::LineGeometryViolation {
                file: path.to_path_buf(),
                line,
                expected,
                actual,
            }),
            GeometryPolicy::Lenient => {
                warn!(
                    file = %path.display(),
                    line,
                    expected,
                    actual,
                    "line geometry violation, indexing record with best-effort geometry"
                );
                Ok(())
            }
        }
    }
}

/// Terminator width of a raw line: 2 for CRLF, 1 for LF, 0 at EOF
fn terminator_len(line: &[u8]) -> usize {
    if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") {
        1
    } else {
        0
    }
}

/// Line without its terminator
fn strip_terminator(line: &[u8]) -> &[u8] {
    &line[..line.len() - terminator_len(line)]
}
