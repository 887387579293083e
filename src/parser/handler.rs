//! SAX-style handler traits the parsers deliver events to.

use crate::error::ParseError;
use crate::source::{ByteSource, RawSource};

/// Receiver for value-parser events.
///
/// All methods default to doing nothing, so a handler only overrides the
/// events it cares about. `pos` arguments are the absolute offset of the
/// value's first byte. String contents arrive as one or more fragments whose
/// borrows are valid only for the duration of the callback.
///
/// Methods are fallible: a handler may abort the parse by returning an
/// error, which is how speculative parses are bounded during resync.
pub trait ValueHandler {
    fn on_object_start(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_object_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_array_start(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_array_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_null(&mut self, _pos: u64) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_bool(&mut self, _pos: u64, _value: bool) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_int(&mut self, _pos: u64, _value: i64) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_uint(&mut self, _pos: u64, _value: u64) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_double(&mut self, _pos: u64, _value: f64) -> Result<(), ParseError> {
        Ok(())
    }

    /// A timestamp, as nanoseconds since the Unix epoch.
    fn on_time(&mut self, _pos: u64, _nanos: u64) -> Result<(), ParseError> {
        Ok(())
    }

    /// A string named by its index in the current dictionary.
    fn on_dict_ref(&mut self, _pos: u64, _index: u64) -> Result<(), ParseError> {
        Ok(())
    }

    /// A string of `len` bytes begins. Unlike the other events, `pos` is the
    /// offset of the first payload byte: the marker and length header are
    /// already consumed, so `pos + len` is exactly where the string ends.
    fn on_string_start(&mut self, _pos: u64, _len: u64) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_string_fragment(&mut self, _fragment: &[u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_string_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }
}

/// A handler that ignores every event. Useful for skipping values while
/// still validating their structure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValueHandler;

impl ValueHandler for NoopValueHandler {}

/// Receiver for record-parser events.
///
/// The record parser handles framing (markers, backrefs, terminators,
/// declared lengths); the handler decides what to do with each record's
/// payload. For value records the handler is given the source positioned at
/// the first value byte and must consume exactly `len` bytes, either by
/// running a [`super::ValueParser`] over it or by skipping.
pub trait RecordHandler<R: RawSource> {
    /// A record begins at absolute offset `pos`.
    fn on_record_start(&mut self, _pos: u64) -> Result<(), ParseError> {
        Ok(())
    }

    /// A header record: format version plus its metadata string.
    fn on_header(&mut self, _pos: u64, _version: u64, _metadata: &[u8]) -> Result<(), ParseError> {
        Ok(())
    }

    /// A dict-clear record: a new dictionary epoch begins at `pos`.
    fn on_dict_clear(&mut self, _pos: u64) -> Result<(), ParseError> {
        Ok(())
    }

    /// A dict-add record at `pos` extending the dict that ends at
    /// `pos - backref` with `entries`, in wire order.
    fn on_dict_add(
        &mut self,
        _pos: u64,
        _backref: u32,
        _entries: Vec<Vec<u8>>,
    ) -> Result<(), ParseError> {
        Ok(())
    }

    /// A value record at `pos` whose dictionary is the one ending at
    /// `pos - backref`. The handler must consume exactly `len` bytes of
    /// value payload from `source`.
    fn on_value(
        &mut self,
        _pos: u64,
        _backref: u32,
        len: u64,
        source: &mut ByteSource<R>,
    ) -> Result<(), ParseError> {
        source.skip(len)?;
        Ok(())
    }

    /// The stream ended cleanly on a record boundary.
    fn on_stream_end(&mut self) -> Result<(), ParseError> {
        Ok(())
    }
}
