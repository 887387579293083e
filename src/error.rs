//! Error types for the Au codec and tooling.

use std::io;
use thiserror::Error;

/// Errors raised by the underlying byte sources.
///
/// Source errors other than [`SourceError::Truncated`] are fatal to the
/// operation that hit them; truncation is surfaced separately because it is
/// the one EOF condition that callers asking for an exact number of bytes
/// need to distinguish from a malformed stream.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Access to the path was denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Opening the underlying file failed for another reason.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that could not be opened
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A read from the underlying source failed.
    #[error("read error: {0}")]
    Io(#[from] io::Error),

    /// Repositioning the underlying source failed.
    #[error("seek to offset {offset} failed: {source}")]
    Seek {
        /// Target absolute offset
        offset: u64,
        /// Underlying I/O error
        source: io::Error,
    },

    /// The source cannot seek (e.g. stdin) and the request could not be
    /// satisfied by reading forward.
    #[error("seeking is not supported by this source")]
    Unseekable,

    /// The total size of the source is unknown (e.g. stdin).
    #[error("the size of this source is unknown")]
    UnknownSize,

    /// EOF was reached while reading an exact number of bytes.
    #[error("reached end of input at offset {offset} while reading {wanted} bytes")]
    Truncated {
        /// Number of bytes the caller asked for
        wanted: usize,
        /// Absolute offset at which input ran out
        offset: u64,
    },
}

/// Errors raised while parsing the Au wire format.
///
/// Offsets are absolute positions in the underlying stream. During resync,
/// any variant that is not an I/O failure means "this candidate is not a
/// record" and the scanner advances one byte and retries.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The byte source failed underneath the parser.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Input ended in the middle of a record or value.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(u64),

    /// A byte that does not fit the grammar at this position.
    #[error("unexpected byte 0x{byte:02x} at offset {offset}: expected {expected}")]
    UnexpectedByte {
        /// Offset of the offending byte
        offset: u64,
        /// The byte that was read
        byte: u8,
        /// What the grammar allows here
        expected: &'static str,
    },

    /// A varint ran past 64 bits of payload.
    #[error("bad varint encoding at offset {0}")]
    InvalidVarint(u64),

    /// A negative integer whose magnitude overflows a signed 64-bit value.
    #[error("signed integer overflow at offset {0}")]
    IntOverflow(u64),

    /// The header or dict-clear record carries an unsupported version.
    #[error("bad format version: expected {expected}, got {found}")]
    BadVersion {
        /// The version this decoder implements
        expected: u64,
        /// The version found on the wire
        found: u64,
    },

    /// Header metadata longer than the format allows.
    #[error("header metadata of {len} bytes exceeds the {max}-byte limit")]
    MetadataTooLarge {
        /// Declared metadata length
        len: u64,
        /// Maximum the format permits
        max: usize,
    },

    /// Value nesting exceeded the depth bound.
    #[error("value nested deeper than {max} levels at offset {offset}")]
    TooDeeplyNested {
        /// Offset of the container that crossed the bound
        offset: u64,
        /// The depth bound
        max: usize,
    },

    /// A dictionary reference outside the resolved dictionary.
    #[error("dictionary index {index} out of range at offset {offset} (dictionary holds {len} entries)")]
    DictRefOutOfRange {
        /// Offset of the reference
        offset: u64,
        /// The out-of-range index
        index: u64,
        /// Number of entries in the resolved dictionary
        len: usize,
    },

    /// A backref that points before the start of the stream, or nowhere.
    #[error("backref {backref} at offset {offset} points outside the stream")]
    BadBackref {
        /// Offset of the record carrying the backref
        offset: u64,
        /// The backref value
        backref: u64,
    },

    /// A backref landed on a position no known dictionary ends at.
    #[error("record at offset {record} references a dictionary at offset {target}, but none ends there")]
    UnknownDictionary {
        /// Offset of the referencing record
        record: u64,
        /// Position the backref resolved to
        target: u64,
    },

    /// A value record whose declared length disagrees with the bytes parsed.
    #[error("value record declared {declared} bytes but {consumed} were consumed")]
    LengthMismatch {
        /// Length declared in the record
        declared: u64,
        /// Bytes actually consumed
        consumed: u64,
    },

    /// A speculative parse read past the declared end of its value record.
    #[error("value runs past its declared end {end} at offset {offset}")]
    ValueOverrun {
        /// Offset of the event that crossed the bound
        offset: u64,
        /// Absolute end of the declared value record
        end: u64,
    },

    /// A string that cannot fit inside its enclosing record.
    #[error("string of {len} bytes at offset {offset} overruns its record")]
    StringTooLong {
        /// Offset of the string value
        offset: u64,
        /// Declared string length
        len: u64,
    },

    /// An object key that is not a string form.
    #[error("object key at offset {0} is not a string")]
    NonStringKey(u64),

    /// The stream does not begin with a header record.
    #[error("no valid header record at the start of the stream")]
    MissingHeader,

    /// Rebuilding a dictionary from its backref chain failed.
    #[error("dictionary rebuild failed: {0}")]
    DictRebuild(String),
}

impl ParseError {
    /// Whether this error is an I/O failure of the underlying source.
    ///
    /// I/O failures are always fatal; every other parse error is treated as
    /// "not a record" by the resync scanner.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            ParseError::Source(
                SourceError::Io(_)
                    | SourceError::NotFound(_)
                    | SourceError::PermissionDenied(_)
                    | SourceError::Open { .. }
                    | SourceError::Seek { .. }
            )
        )
    }
}

/// Errors raised while encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Writing an encoded record to the sink failed.
    #[error("write error: {0}")]
    Io(#[from] io::Error),

    /// Value nesting exceeded the depth bound.
    #[error("value nested deeper than {0} levels")]
    TooDeeplyNested(usize),

    /// More than `u32::MAX` bytes were emitted since the last dictionary
    /// record, which cannot be expressed as a backref.
    #[error("dictionary backref distance overflowed 32 bits")]
    BackrefOverflow,
}

/// Top-level error type composing the codec layers, used by the high-level
/// entry points and the `au` binary.
#[derive(Debug, Error)]
pub enum AuError {
    /// Wire-level parse failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Byte source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Encoding failure.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The resync scanner could not locate a value record.
    #[error("unable to locate the start of a valid value record")]
    SyncFailed,

    /// Invalid JSON input while re-encoding.
    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// Output stream failure.
    #[error("output error: {0}")]
    Io(#[from] io::Error),

    /// Invalid combination or form of user-supplied options.
    #[error("{0}")]
    Usage(String),
}
