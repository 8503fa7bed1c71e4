//! Coordinate translation: payload positions to file byte offsets
//!
//! The descriptor's line geometry makes the translation pure arithmetic.
//! With `per_line = line_length - terminator_length` and a 0-based payload
//! position `k`, the byte offset of that payload byte is
//!
//! ```text
//! offset + line_length * (k / per_line) + (k % per_line)
//! ```
//!
//! No scanning, regardless of how far into the record the position lies.
//! Extraction seeks to the first byte of the span, reads the raw range
//! (terminators included) in one read, and strips terminator bytes at every
//! line boundary on the way out.
//!
//! # Query Grammar
//!
//! When a query string carries no explicit bounds, an inline range may be
//! embedded in the identifier: `<id>:<start><sep><stop>` with `<sep>` one of
//! `,`, `-`, `..`, and digits optionally grouped with `_`:
//!
//! ```text
//! chr1:5,12    chr1:5-12    chr1:5..12    chr1:1_000,2_000
//! ```
//!
//! Reversed bounds (`chr1:12..5`) select the same bytes and mark the result
//! as reverse-strand.

use crate::error::Result;
use crate::index::descriptor::RecordDescriptor;
use crate::types::Strand;
use regex::Regex;
use std::io::{Read, Seek, SeekFrom};
use std::sync::OnceLock;

static COMPOUND_RE: OnceLock<Regex> = OnceLock::new();

fn compound_re() -> &'static Regex {
    COMPOUND_RE.get_or_init(|| {
        Regex::new(r"^(?<id>.+):(?<a>[0-9][0-9_]*)(?:\.\.|,|-)(?<b>[0-9][0-9_]*)$")
            .expect("hard-coded pattern")
    })
}

/// Split a compound identifier into `(core_id, start, stop)`
///
/// Returns `None` when the query does not match the grammar.
pub fn parse_compound(query: &str) -> Option<(String, u64, u64)> {
    let caps = compound_re().captures(query)?;
    let a = parse_position(&caps["a"])?;
    let b = parse_position(&caps["b"])?;
    Some((caps["id"].to_string(), a, b))
}

fn parse_position(digits: &str) -> Option<u64> {
    digits.replace('_', "").parse().ok()
}

/// Apply defaults, strand detection, and clamping to a requested range
///
/// Positions are 1-based and inclusive. A missing start defaults to 1, a
/// missing stop to the record length. Reversed bounds are swapped and
/// reported as [`Strand::Reverse`]; clamping happens after the swap. The
/// resulting range is empty (`stop < start`) when it falls entirely outside
/// the record.
pub fn resolve_range(
    seq_length: u64,
    start: Option<u64>,
    stop: Option<u64>,
) -> (u64, u64, Strand) {
    let mut start = start.unwrap_or(1);
    let mut stop = stop.unwrap_or(seq_length);

    let strand = if start > stop {
        std::mem::swap(&mut start, &mut stop);
        Strand::Reverse
    } else {
        Strand::Forward
    };

    (start.max(1), stop.min(seq_length), strand)
}

/// File byte offset of the n-th (1-based) payload byte
///
/// The descriptor must describe a record with at least one content line
/// (`payload_per_line() > 0`).
pub fn content_offset(d: &RecordDescriptor, n: u64) -> u64 {
    let k = n - 1;
    let per_line = d.payload_per_line();
    d.offset + u64::from(d.line_length) * (k / per_line) + (k % per_line)
}

/// Read the payload bytes of `[start, stop]` (1-based, inclusive)
///
/// The range must already be resolved via [`resolve_range`]. Terminator
/// bytes interleaved with the payload are stripped; the result holds exactly
/// `stop - start + 1` bytes, or nothing for an empty range.
pub fn read_span<R: Read + Seek>(
    reader: &mut R,
    d: &RecordDescriptor,
    start: u64,
    stop: u64,
) -> Result<Vec<u8>> {
    if stop < start || d.seq_length == 0 {
        return Ok(Vec::new());
    }
    let per_line = d.payload_per_line();
    if per_line == 0 {
        return Ok(Vec::new());
    }

    let first = content_offset(d, start);
    let last = content_offset(d, stop);
    let raw_len = (last - first + 1) as usize;

    reader.seek(SeekFrom::Start(first))?;
    let mut raw = vec![0u8; raw_len];
    reader.read_exact(&mut raw)?;

    let need = (stop - start + 1) as usize;
    let terminator = usize::from(d.terminator_length);
    let per_line = per_line as usize;
    let mut out = Vec::with_capacity(need);
    let mut column = ((start - 1) % d.payload_per_line()) as usize;
    let mut i = 0usize;
    while out.len() < need && i < raw.len() {
        out.push(raw[i]);
        i += 1;
        column += 1;
        if column == per_line {
            i += terminator;
            column = 0;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_compound_separators() {
        assert_eq!(
            parse_compound("chr1:5,12"),
            Some(("chr1".to_string(), 5, 12))
        );
        assert_eq!(
            parse_compound("chr1:5-12"),
            Some(("chr1".to_string(), 5, 12))
        );
        assert_eq!(
            parse_compound("chr1:5..12"),
            Some(("chr1".to_string(), 5, 12))
        );
    }

    #[test]
    fn test_parse_compound_underscores() {
        assert_eq!(
            parse_compound("chr1:1_000,2_000"),
            Some(("chr1".to_string(), 1000, 2000))
        );
    }

    #[test]
    fn test_parse_compound_reversed() {
        assert_eq!(
            parse_compound("chr1:12..5"),
            Some(("chr1".to_string(), 12, 5))
        );
    }

    #[test]
    fn test_parse_compound_id_with_colon() {
        // Greedy id capture: only the trailing range is split off.
        assert_eq!(
            parse_compound("lcl|gi:123:4,8"),
            Some(("lcl|gi:123".to_string(), 4, 8))
        );
    }

    #[test]
    fn test_parse_compound_rejects() {
        assert_eq!(parse_compound("chr1"), None);
        assert_eq!(parse_compound("chr1:5"), None);
        assert_eq!(parse_compound("chr1:a,b"), None);
        assert_eq!(parse_compound("chr1:5.12"), None);
        assert_eq!(parse_compound(":5,12"), None);
    }

    #[test]
    fn test_resolve_defaults_and_clamp() {
        assert_eq!(resolve_range(17, None, None), (1, 17, Strand::Forward));
        assert_eq!(resolve_range(17, Some(5), None), (5, 17, Strand::Forward));
        assert_eq!(resolve_range(17, None, Some(8)), (1, 8, Strand::Forward));
        assert_eq!(resolve_range(17, Some(0), Some(99)), (1, 17, Strand::Forward));
    }

    #[test]
    fn test_resolve_strand() {
        assert_eq!(resolve_range(17, Some(12), Some(5)), (5, 12, Strand::Reverse));
        assert_eq!(resolve_range(17, Some(5), Some(12)), (5, 12, Strand::Forward));
    }

    #[test]
    fn test_resolve_empty_ranges() {
        // Start beyond the record
        let (start, stop, _) = resolve_range(10, Some(20), Some(30));
        assert!(stop < start);
        // Zero-length record
        let (start, stop, _) = resolve_range(0, None, None);
        assert!(stop < start);
    }

    fn wrapped(payload: &[u8], per_line: usize, terminator: &[u8]) -> (Vec<u8>, RecordDescriptor) {
        let header = b">test\n";
        let mut file = header.to_vec();
        for chunk in payload.chunks(per_line) {
            file.extend_from_slice(chunk);
            file.extend_from_slice(terminator);
        }
        let d = RecordDescriptor {
            offset: header.len() as u64,
            seq_length: payload.len() as u64,
            line_length: (per_line + terminator.len()) as u16,
            terminator_length: terminator.len() as u16,
            file_no: 0,
            payload_kind: 0,
        };
        (file, d)
    }

    #[test]
    fn test_offset_formula() {
        // 20 payload bytes per line, 1-byte terminator, content at 10.
        let d = RecordDescriptor {
            offset: 10,
            seq_length: 100,
            line_length: 21,
            terminator_length: 1,
            file_no: 0,
            payload_kind: 0,
        };
        assert_eq!(content_offset(&d, 1), 10);
        assert_eq!(content_offset(&d, 20), 29);
        assert_eq!(content_offset(&d, 21), 31);
        assert_eq!(content_offset(&d, 41), 52);
    }

    #[test]
    fn test_read_span_within_line() {
        let (file, d) = wrapped(b"AAAACCCCGGGGTTTTN", 8, b"\n");
        let mut cursor = Cursor::new(file);
        assert_eq!(read_span(&mut cursor, &d, 1, 8).unwrap(), b"AAAACCCC");
    }

    #[test]
    fn test_read_span_across_lines() {
        let (file, d) = wrapped(b"AAAACCCCGGGGTTTTN", 8, b"\n");
        let mut cursor = Cursor::new(file);
        assert_eq!(read_span(&mut cursor, &d, 5, 12).unwrap(), b"CCCCGGGG");
        assert_eq!(read_span(&mut cursor, &d, 17, 17).unwrap(), b"N");
    }

    #[test]
    fn test_read_span_crlf() {
        let (file, d) = wrapped(b"AAAACCCCGGGGTTTTN", 8, b"\r\n");
        let mut cursor = Cursor::new(file);
        assert_eq!(read_span(&mut cursor, &d, 5, 12).unwrap(), b"CCCCGGGG");
        assert_eq!(read_span(&mut cursor, &d, 1, 17).unwrap(), b"AAAACCCCGGGGTTTTN");
    }

    #[test]
    fn test_read_span_empty_range() {
        let (file, d) = wrapped(b"ACGT", 8, b"\n");
        let mut cursor = Cursor::new(file);
        assert_eq!(read_span(&mut cursor, &d, 5, 4).unwrap(), b"");
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        /// Single-byte extraction matches a brute-force scan that strips
        /// terminators.
        #[test]
        fn test_offset_formula_matches_brute_force(
            payload in proptest::collection::vec(proptest::sample::select(&b"ACGTN"[..]), 1..200),
            per_line in 1usize..30,
            crlf: bool,
        ) {
            let terminator: &[u8] = if crlf { b"\r\n" } else { b"\n" };
            let (file, d) = wrapped(&payload, per_line, terminator);
            let mut cursor = Cursor::new(file);
            for n in 1..=payload.len() as u64 {
                let byte = read_span(&mut cursor, &d, n, n).unwrap();
                prop_assert_eq!(&byte[..], &payload[(n - 1) as usize..n as usize]);
            }
        }

        /// subseq(a, c) = subseq(a, b) ++ subseq(b + 1, c)
        #[test]
        fn test_subrange_composition(
            payload in proptest::collection::vec(proptest::sample::select(&b"ACGTN"[..]), 3..120),
            per_line in 1usize..20,
            splits in proptest::collection::vec(0.0f64..1.0, 2),
        ) {
            let len = payload.len() as u64;
            let a = 1 + (splits[0] * (len - 2) as f64) as u64;
            let b = a + (splits[1] * (len - a) as f64) as u64;
            let c = len;
            prop_assume!(a <= b && b < c);

            let (file, d) = wrapped(&payload, per_line, b"\n");
            let mut cursor = Cursor::new(file);
            let whole = read_span(&mut cursor, &d, a, c).unwrap();
            let left = read_span(&mut cursor, &d, a, b).unwrap();
            let right = read_span(&mut cursor, &d, b + 1, c).unwrap();
            prop_assert_eq!(whole, [left, right].concat());
        }
    }
}
