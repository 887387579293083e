//! Tailing: enter a stream near its end and decode forward.

mod rebuild;
mod sync;

use crate::decoder::Decoder;
use crate::error::{AuError, ParseError};
use crate::source::{ByteSource, RawSource};
use crate::value::Value;

/// Decodes the tail of a stream: resync near end-of-file, then stream
/// forward, optionally following appended data.
pub struct TailReader<R> {
    decoder: Decoder<R>,
}

impl<R: RawSource> TailReader<R> {
    /// A tail reader over `source`. No header is required; the reader enters
    /// the stream mid-way by design.
    pub fn new(source: ByteSource<R>) -> Self {
        Self {
            decoder: Decoder::new(source).allow_missing_header(),
        }
    }

    /// Position the source so the scan covers the last `window` bytes, then
    /// locate the first valid value record.
    ///
    /// Returns `false` when no value record could be validated; the caller
    /// should suggest a larger window.
    pub fn start(&mut self, window: u64) -> Result<bool, ParseError> {
        // Two extra bytes so a value record starting exactly at the window
        // edge is still found: the scan pattern includes the terminator of
        // the preceding record.
        self.decoder.source.tail(window.saturating_add(2))?;
        self.decoder.sync()
    }

    /// Locate the next valid value record from the current position without
    /// moving first. See [`Decoder::sync`].
    pub fn sync(&mut self) -> Result<bool, ParseError> {
        self.decoder.sync()
    }

    /// Decode forward to the next value record.
    pub fn next_value(&mut self) -> Result<Option<(u64, Value)>, ParseError> {
        self.decoder.next_value()
    }

    /// Decode every remaining value record, invoking `visit` for each.
    pub fn decode_stream<F>(&mut self, visit: F) -> Result<(), AuError>
    where
        F: FnMut(u64, Value) -> Result<(), AuError>,
    {
        self.decoder.decode_stream(visit)
    }

    /// Absolute position of the read cursor.
    pub fn pos(&self) -> u64 {
        self.decoder.pos()
    }
}
