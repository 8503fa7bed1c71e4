//! Record descriptor and its fixed-width binary codec
//!
//! Every indexed record is summarized by one fixed-layout descriptor that is
//! enough to translate any payload position into a byte offset in the source
//! file without rereading it.
//!
//! # Packed Layout
//!
//! All fields are big-endian so index files are portable across machines.
//! Two variants exist, differing only in the width of `offset` and
//! `seq_length`:
//!
//! ```text
//! 32-bit codec (14 bytes):          64-bit codec (22 bytes):
//! offset             u32            offset             u64
//! seq_length         u32            seq_length         u64
//! line_length        u16            line_length        u16
//! terminator_length  u16            terminator_length  u16
//! file_no            u8             file_no            u8
//! payload_kind       u8             payload_kind       u8
//! ```
//!
//! The 64-bit variant is selected iff the largest source file exceeds
//! `u32::MAX` bytes. The choice is made once per index, recorded under the
//! `__codec__` meta-key, and never changes for the life of the index.

use crate::error::{Result, SeqDbError};

/// Fixed-width description of one indexed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// Absolute byte offset of the first content byte (past the header line)
    pub offset: u64,
    /// Total content bytes, excluding header and line terminators
    pub seq_length: u64,
    /// Bytes of a full interior content line, including its terminator
    pub line_length: u16,
    /// Bytes in the line terminator: 1 for LF, 2 for CRLF
    pub terminator_length: u16,
    /// Index into the file registry
    pub file_no: u8,
    /// Opaque payload tag assigned by the scanner's classifier
    pub payload_kind: u8,
}

impl RecordDescriptor {
    /// Payload bytes per full content line (line length minus terminator)
    ///
    /// Zero for records with no content lines.
    pub fn payload_per_line(&self) -> u64 {
        u64::from(self.line_length - self.terminator_length)
    }
}

/// Offset width variant of the packed descriptor layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// 32-bit offsets: all source files fit in `u32::MAX` bytes
    Bits32,
    /// 64-bit offsets: at least one source file exceeds `u32::MAX` bytes
    Bits64,
}

impl Codec {
    /// Packed descriptor size in bytes for this variant
    pub const fn packed_len(self) -> usize {
        match self {
            Codec::Bits32 => 14,
            Codec::Bits64 => 22,
        }
    }

    /// Selection rule: 64-bit iff the largest source file exceeds `u32::MAX`
    pub fn for_max_file_size(max_file_size: u64) -> Self {
        if max_file_size > u64::from(u32::MAX) {
            Codec::Bits64
        } else {
            Codec::Bits32
        }
    }

    /// Value stored under the `__codec__` meta-key
    pub fn tag(self) -> &'static [u8] {
        match self {
            Codec::Bits32 => b"32",
            Codec::Bits64 => b"64",
        }
    }

    /// Parse a `__codec__` meta-value back into a variant
    pub fn from_tag(tag: &[u8]) -> Result<Self> {
        match tag {
            b"32" => Ok(Codec::Bits32),
            b"64" => Ok(Codec::Bits64),
            other => Err(SeqDbError::IndexUnavailable {
                msg: format!(
                    "unrecognized codec tag {:?}",
                    String::from_utf8_lossy(other)
                ),
            }),
        }
    }

    /// Pack a descriptor into this variant's fixed layout
    ///
    /// Fails only if a field exceeds the 32-bit variant's range, which the
    /// selection rule rules out for descriptors built by the indexer.
    pub fn pack(self, d: &RecordDescriptor) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.packed_len());
        match self {
            Codec::Bits32 => {
                let offset = u32::try_from(d.offset).map_err(|_| overflow(d.offset))?;
                let seq_length = u32::try_from(d.seq_length).map_err(|_| overflow(d.seq_length))?;
                buf.extend_from_slice(&offset.to_be_bytes());
                buf.extend_from_slice(&seq_length.to_be_bytes());
            }
            Codec::Bits64 => {
                buf.extend_from_slice(&d.offset.to_be_bytes());
                buf.extend_from_slice(&d.seq_length.to_be_bytes());
            }
        }
        buf.extend_from_slice(&d.line_length.to_be_bytes());
        buf.extend_from_slice(&d.terminator_length.to_be_bytes());
        buf.push(d.file_no);
        buf.push(d.payload_kind);
        Ok(buf)
    }

    /// Unpack a descriptor from this variant's fixed layout
    pub fn unpack(self, bytes: &[u8]) -> Result<RecordDescriptor> {
        if bytes.len() != self.packed_len() {
            return Err(SeqDbError::IndexUnavailable {
                msg: format!(
                    "packed descriptor is {} bytes, expected {}",
                    bytes.len(),
                    self.packed_len()
                ),
            });
        }

        let (offset, seq_length, rest) = match self {
            Codec::Bits32 => {
                let offset = u32::from_be_bytes(read4(&bytes[0..4]));
                let seq_length = u32::from_be_bytes(read4(&bytes[4..8]));
                (u64::from(offset), u64::from(seq_length), &bytes[8..])
            }
            Codec::Bits64 => {
                let offset = u64::from_be_bytes(read8(&bytes[0..8]));
                let seq_length = u64::from_be_bytes(read8(&bytes[8..16]));
                (offset, seq_length, &bytes[16..])
            }
        };

        Ok(RecordDescriptor {
            offset,
            seq_length,
            line_length: u16::from_be_bytes([rest[0], rest[1]]),
            terminator_length: u16::from_be_bytes([rest[2], rest[3]]),
            file_no: rest[4],
            payload_kind: rest[5],
        })
    }
}

fn overflow(value: u64) -> SeqDbError {
    SeqDbError::IndexUnavailable {
        msg: format!("value {} overflows the 32-bit descriptor codec", value),
    }
}

fn read4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn read8(bytes: &[u8]) -> [u8; 8] {
    [
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordDescriptor {
        RecordDescriptor {
            offset: 112,
            seq_length: 248_956_422,
            line_length: 71,
            terminator_length: 1,
            file_no: 3,
            payload_kind: 1,
        }
    }

    #[test]
    fn test_packed_sizes() {
        assert_eq!(Codec::Bits32.packed_len(), 14);
        assert_eq!(Codec::Bits64.packed_len(), 22);
    }

    #[test]
    fn test_round_trip_32() {
        let d = sample();
        let packed = Codec::Bits32.pack(&d).unwrap();
        assert_eq!(packed.len(), 14);
        assert_eq!(Codec::Bits32.unpack(&packed).unwrap(), d);
    }

    #[test]
    fn test_round_trip_64() {
        let mut d = sample();
        d.offset = 5_000_000_000;
        d.seq_length = 4_900_000_000;
        let packed = Codec::Bits64.pack(&d).unwrap();
        assert_eq!(packed.len(), 22);
        assert_eq!(Codec::Bits64.unpack(&packed).unwrap(), d);
    }

    #[test]
    fn test_selection_rule() {
        assert_eq!(Codec::for_max_file_size(0), Codec::Bits32);
        assert_eq!(Codec::for_max_file_size(u64::from(u32::MAX)), Codec::Bits32);
        assert_eq!(
            Codec::for_max_file_size(u64::from(u32::MAX) + 1),
            Codec::Bits64
        );
    }

    #[test]
    fn test_pack_overflow_rejected() {
        let mut d = sample();
        d.offset = u64::from(u32::MAX) + 1;
        assert!(Codec::Bits32.pack(&d).is_err());
        assert!(Codec::Bits64.pack(&d).is_ok());
    }

    #[test]
    fn test_unpack_wrong_length() {
        assert!(Codec::Bits32.unpack(&[0u8; 22]).is_err());
        assert!(Codec::Bits64.unpack(&[0u8; 14]).is_err());
    }

    #[test]
    fn test_tag_round_trip() {
        assert_eq!(Codec::from_tag(b"32").unwrap(), Codec::Bits32);
        assert_eq!(Codec::from_tag(b"64").unwrap(), Codec::Bits64);
        assert!(Codec::from_tag(b"128").is_err());
    }

    #[test]
    fn test_payload_per_line() {
        let d = sample();
        assert_eq!(d.payload_per_line(), 70);
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        /// unpack(pack(d)) = d under the 32-bit codec
        #[test]
        fn test_descriptor_round_trip_32(
            offset in 0..=u64::from(u32::MAX),
            seq_length in 0..=u64::from(u32::MAX),
            line_length in 1u16..,
            terminator_length in 1u16..=2,
            file_no: u8,
            payload_kind: u8,
        ) {
            prop_assume!(line_length > terminator_length);
            let d = RecordDescriptor {
                offset, seq_length, line_length, terminator_length, file_no, payload_kind,
            };
            let packed = Codec::Bits32.pack(&d).unwrap();
            prop_assert_eq!(Codec::Bits32.unpack(&packed).unwrap(), d);
        }

        /// unpack(pack(d)) = d under the 64-bit codec
        #[test]
        fn test_descriptor_round_trip_64(
            offset: u64,
            seq_length: u64,
            line_length in 1u16..,
            terminator_length in 1u16..=2,
            file_no: u8,
            payload_kind: u8,
        ) {
            prop_assume!(line_length > terminator_length);
            let d = RecordDescriptor {
                offset, seq_length, line_length, terminator_length, file_no, payload_kind,
            };
            let packed = Codec::Bits64.pack(&d).unwrap();
            prop_assert_eq!(Codec::Bits64.unpack(&packed).unwrap(), d);
        }
    }
}
