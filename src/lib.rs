//! Au: a compact binary container format for streams of JSON-like records.
//!
//! The codec is a single-threaded streaming design: the [`Encoder`] interns
//! recurring strings into an adaptive dictionary and frames each value as a
//! self-delimited record; the [`Decoder`] parses records back out,
//! resolving dictionary references as it goes. Because dictionary records
//! carry backrefs to their predecessors, a reader can also enter a stream at
//! an arbitrary offset — [`TailReader`] scans for a record boundary and
//! rebuilds the dictionary by walking the backref chain backward, at a cost
//! proportional to the dictionary epoch rather than the file.

pub mod decoder;
pub mod dictionary;
pub mod encoder;
pub mod error;
pub mod grep;
pub mod intern;
pub mod marker;
pub mod parser;
pub mod source;
pub mod tail;
pub mod value;
pub mod varint;

// Re-export the main types.
pub use decoder::{Decoder, Header};
pub use dictionary::{Dict, DictionaryCache};
pub use encoder::{Encoder, EncoderConfig, ValueWriter};
pub use error::{AuError, EncodeError, ParseError, SourceError};
pub use grep::{GrepRunner, Pattern};
pub use intern::{StringIntern, UsageTracker};
pub use parser::{NoopValueHandler, RecordHandler, RecordParser, ValueHandler, ValueParser};
pub use source::{ByteSource, FileSource, MemorySource, RawSource, StdinSource};
pub use tail::TailReader;
pub use value::{Value, ValueBuilder};
