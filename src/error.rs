/// Custom Result type for traceseq operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the traceseq library, encompassing all possible error
/// cases that can occur while encoding, decoding, or parsing sequence data.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors raised by the codec layer (bit-packed, run-length, delta)
    CodecError(#[from] CodecError),
    /// Errors raised while decoding binary trace files (ZTR, SFF, SCF)
    TraceError(#[from] TraceError),
    /// Errors raised while parsing text formats (FASTA, FASTQ, ACE)
    ParseError(#[from] ParseError),
    /// Errors raised by the datastore layer
    StoreError(#[from] StoreError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// UTF-8 encoding/decoding errors
    Utf8Error(#[from] std::str::Utf8Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}

/// Errors raised by the codec layer.
///
/// These are never retried: they indicate either a programming error
/// (unsupported input, bad configuration) or corrupted input bytes.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The input contains a symbol outside the codec's supported alphabet
    ///
    /// # Fields
    /// * `symbol` - The offending symbol, as a character
    /// * `alphabet` - A short description of the supported alphabet
    #[error("Symbol '{symbol}' is outside the supported alphabet ({alphabet})")]
    UnsupportedSymbol { symbol: char, alphabet: &'static str },

    /// A decode index at or beyond the decoded length was requested
    ///
    /// # Fields
    /// * `index` - The requested index
    /// * `last_valid` - The last index that can be decoded
    #[error("Requested index ({index}) is beyond the last valid index ({last_valid})")]
    IndexOutOfRange { index: usize, last_valid: usize },

    /// A delta level outside {1, 2, 3} was requested
    #[error("Invalid delta level: {0} (must be 1, 2, or 3)")]
    InvalidDeltaLevel(u8),

    /// A delta stream carries a level byte outside {1, 2, 3}
    #[error("Malformed delta stream: level byte {0} is not 1, 2, or 3")]
    MalformedLevelByte(u8),

    /// An encoded stream opens with a format tag this codec does not know
    #[error("Unknown format tag: {0}")]
    UnknownFormatTag(u8),

    /// A run token of length zero was given for a value other than the guard
    #[error("Zero-length run for non-guard value: {0}")]
    ZeroLengthRun(u8),

    /// A run list decodes to more values than the u32 length header can hold
    #[error("Total run length ({0}) exceeds the u32 header limit")]
    RunTotalOverflow(u64),

    /// The input length is not a multiple of the lane width
    #[error("Input of {len} bytes is not a multiple of the {width}-byte lane width")]
    UnalignedLane { len: usize, width: usize },

    /// A quality score beyond the printable-ASCII ceiling was given
    #[error("Invalid quality score: {0} (maximum is 93)")]
    InvalidQualityScore(u8),

    /// The encoded buffer ends before its header is complete
    #[error("Truncated header: expected {expected} bytes, found {got}")]
    TruncatedHeader { expected: usize, got: usize },

    /// The encoded buffer ends inside the payload or a token
    #[error("Truncated payload at byte offset {0}")]
    TruncatedPayload(usize),

    /// The payload length disagrees with the header
    #[error("Unexpected payload length: expected {expected} bytes, found {got}")]
    UnexpectedPayloadLength { expected: usize, got: usize },

    /// The gap-offset width selector is not one of 1, 2, or 4
    #[error("Invalid offset width selector: {0}")]
    InvalidOffsetWidth(u8),

    /// A sentinel offset list is not strictly increasing
    #[error("Sentinel offsets out of order at list position {0}")]
    OffsetsOutOfOrder(usize),

    /// A packed payload slot holds a code outside the codec's alphabet
    #[error("Invalid packed symbol code: {0}")]
    InvalidPackedCode(u8),

    /// A sentinel offset points at or beyond the decoded length
    #[error("Sentinel offset ({offset}) is beyond the decoded length ({length})")]
    OffsetBeyondLength { offset: u32, length: u32 },

    /// The token stream decoded to a different length than the header claims
    #[error("Decoded length ({decoded}) does not match the header ({header})")]
    LengthMismatch { header: usize, decoded: usize },
}

/// Errors raised while decoding binary trace files.
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    /// The magic number at the start of the file does not match
    ///
    /// # Fields
    /// * `expected` - The magic bytes the format requires
    /// * `found` - The bytes actually present
    #[error("Invalid magic number: {found:?} (expected {expected:?})")]
    InvalidMagicNumber {
        expected: &'static [u8],
        found: Vec<u8>,
    },

    /// The format version is not supported
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(String),

    /// The file being read is not a regular file (e.g. a directory or special file)
    #[error("File is not regular")]
    IncompatibleFile,

    /// The file ends before the structure described by its headers
    ///
    /// # Arguments
    /// * `usize` - The byte position where the truncation was detected
    #[error(
        "Number of bytes in file does not match expectation - possibly truncated at byte pos {0}"
    )]
    FileTruncation(usize),

    /// A chunk ends before its declared length
    #[error("Truncated {chunk} chunk at byte offset {offset}")]
    TruncatedChunk { chunk: String, offset: usize },

    /// A record's header fields are internally inconsistent
    #[error("Malformed {format} record at byte offset {offset}")]
    MalformedRecord {
        format: &'static str,
        offset: usize,
    },

    /// A chunk payload failed to decode
    ///
    /// Carries the chunk type and the byte offset of the chunk within the file
    /// so corrupt traces can be located without a hex dump.
    #[error("Malformed {chunk} chunk at byte offset {offset}")]
    ChunkDecode {
        chunk: String,
        offset: usize,
        #[source]
        source: CodecError,
    },

    /// A chunk declares an encoding format this reader does not know
    #[error("Unknown format tag {tag} in {chunk} chunk at byte offset {offset}")]
    UnknownFormatTag {
        tag: u8,
        chunk: String,
        offset: usize,
    },

    /// Attempted to access a record index beyond the available range
    #[error("Requested record index ({0}) is out of record range ({1})")]
    OutOfRange(usize, usize),

    /// Chromatogram sections do not align by index
    ///
    /// # Fields
    /// * `bases` - Number of basecalls
    /// * `peaks` - Number of peak positions
    /// * `confidences` - Number of confidence values
    #[error(
        "Chromatogram sections disagree in length: {bases} bases, {peaks} peaks, {confidences} confidences"
    )]
    SectionMisalignment {
        bases: usize,
        peaks: usize,
        confidences: usize,
    },

    /// A required section is missing from the builder
    #[error("Missing {0} section in chromatogram builder")]
    MissingSection(&'static str),
}

/// Errors raised while parsing line-oriented text formats.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The first record line does not carry the expected prefix
    #[error("Missing '{prefix}' prefix at line {line}")]
    MissingPrefix { prefix: char, line: usize },

    /// The input ended in the middle of a record
    #[error("Unexpected end of input at line {0}")]
    UnexpectedEof(usize),

    /// A record field could not be parsed
    ///
    /// # Fields
    /// * `record` - The record kind being parsed (e.g. "CO", "QA", "fastq")
    /// * `line` - The 1-based line number
    #[error("Malformed {record} record at line {line}")]
    MalformedRecord { record: &'static str, line: usize },

    /// The base and quality strings of a record disagree in length
    #[error("Sequence/quality length mismatch for '{id}': {bases} bases, {quals} scores")]
    LengthMismatch {
        id: String,
        bases: usize,
        quals: usize,
    },
}

/// Errors raised by the datastore layer.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The store was accessed after `close`
    #[error("Datastore is closed")]
    Closed,

    /// A bounded cache was configured with no capacity
    #[error("Cache capacity must be nonzero")]
    ZeroCapacity,
}
