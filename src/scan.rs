//! Scanner strategy: the per-format knowledge injected into the indexer
//!
//! The indexer itself is format-agnostic. Everything FASTA-specific (the
//! sentinel byte, how an identifier is cut out of a header, what the payload
//! looks like) lives behind [`RecordScanner`], so quality files or other
//! header-plus-content formats index through the same machinery with a
//! different strategy instance.

/// Payload tag for unclassifiable content
pub const PAYLOAD_UNKNOWN: u8 = 0;
/// Payload tag for DNA content
pub const PAYLOAD_DNA: u8 = 1;
/// Payload tag for RNA content
pub const PAYLOAD_RNA: u8 = 2;
/// Payload tag for protein content
pub const PAYLOAD_PROTEIN: u8 = 3;

/// Per-format capability handed to the indexer
pub trait RecordScanner {
    /// Sentinel test: does this line start a new record?
    ///
    /// Called with the raw line including its terminator. The sentinel must
    /// sit at column 0.
    fn is_header(&self, line: &[u8]) -> bool;

    /// Extract the record identifier from a header line
    ///
    /// Called with the header line, sentinel included, terminator stripped.
    fn extract_id(&self, header_line: &[u8]) -> Vec<u8>;

    /// Classify the record's payload from its first content line
    ///
    /// The returned tag is stored opaquely in the descriptor. The default
    /// declines to guess.
    fn classify(&self, _first_content_line: &[u8]) -> u8 {
        PAYLOAD_UNKNOWN
    }
}

/// The built-in scanner for FASTA-shaped files
///
/// Recognizes records by a configurable sentinel byte (default `>`, use `+`
/// for quality files), extracts the identifier as the bytes between the
/// sentinel and the first ASCII whitespace, and tags payloads by residue
/// alphabet. An `id_transform` closure replaces the default extraction and
/// receives the full header line.
pub struct FastaScanner {
    sentinel: u8,
    id_transform: Option<Box<dyn Fn(&[u8]) -> Vec<u8>>>,
}

impl FastaScanner {
    /// Scanner with the `>` sentinel and default id extraction
    pub fn new() -> Self {
        Self {
            sentinel: b'>',
            id_transform: None,
        }
    }

    /// Override the sentinel byte
    pub fn with_sentinel(mut self, sentinel: u8) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// Install a custom header-to-id mapping
    ///
    /// The closure receives the full header line (sentinel included,
    /// terminator stripped) and its return value becomes the record key.
    pub fn with_id_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + 'static,
    {
        self.id_transform = Some(Box::new(transform));
        self
    }
}

impl Default for FastaScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordScanner for FastaScanner {
    fn is_header(&self, line: &[u8]) -> bool {
        line.first() == Some(&self.sentinel)
    }

    fn extract_id(&self, header_line: &[u8]) -> Vec<u8> {
        if let Some(transform) = &self.id_transform {
            return transform(header_line);
        }
        let after_sentinel = &header_line[1..];
        let end = after_sentinel
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .unwrap_or(after_sentinel.len());
        after_sentinel[..end].to_vec()
    }

    fn classify(&self, first_content_line: &[u8]) -> u8 {
        classify_residues(first_content_line)
    }
}

/// Residue-alphabet classification of a content line
///
/// DNA before RNA before protein: a line of `GATC` matches all three
/// alphabets and is reported as DNA. Anything outside the amino-acid
/// alphabet is unknown.
fn classify_residues(line: &[u8]) -> u8 {
    if line.is_empty() {
        return PAYLOAD_UNKNOWN;
    }
    if line
        .iter()
        .all(|b| matches!(b.to_ascii_uppercase(), b'G' | b'A' | b'T' | b'C' | b'N' | b'-'))
    {
        return PAYLOAD_DNA;
    }
    if line
        .iter()
        .all(|b| matches!(b.to_ascii_uppercase(), b'G' | b'A' | b'U' | b'C' | b'N' | b'-'))
    {
        return PAYLOAD_RNA;
    }
    if line
        .iter()
        .all(|b| b.is_ascii_alphabetic() || *b == b'-' || *b == b'*')
    {
        return PAYLOAD_PROTEIN;
    }
    PAYLOAD_UNKNOWN
}
