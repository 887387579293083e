//! Forward streaming decode with dictionary tracking.
//!
//! `Decoder` drives the record parser over a byte source, maintains the
//! dictionary epochs the stream announces, and hands each value record back
//! as an owned [`Value`]. Tailing enters a stream mid-way through
//! [`crate::tail::TailReader`], which shares this type.

use crate::dictionary::DictionaryCache;
use crate::error::{AuError, ParseError};
use crate::parser::{RecordHandler, RecordParser, ValueParser};
use crate::source::{ByteSource, RawSource};
use crate::value::{Value, ValueBuilder};

/// Contents of a stream's header record.
#[derive(Debug, Clone)]
pub struct Header {
    /// Format version (always 1).
    pub version: u64,
    /// Free-form metadata bytes.
    pub metadata: Vec<u8>,
}

/// Streaming decoder over a byte source.
pub struct Decoder<R> {
    pub(crate) source: ByteSource<R>,
    pub(crate) dicts: DictionaryCache,
    require_header: bool,
    header: Option<Header>,
}

impl<R: RawSource> Decoder<R> {
    /// A decoder for a stream read from its start; the first record must be
    /// a valid header.
    pub fn new(source: ByteSource<R>) -> Self {
        Self {
            source,
            dicts: DictionaryCache::new(),
            require_header: true,
            header: None,
        }
    }

    /// Tolerate a stream without a leading header record, as when entering
    /// mid-stream.
    pub fn allow_missing_header(mut self) -> Self {
        self.require_header = false;
        self
    }

    /// The stream header, once one has been parsed.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Absolute position of the read cursor.
    pub fn pos(&self) -> u64 {
        self.source.pos()
    }

    /// Decode forward until the next value record, returning its start
    /// offset and decoded value, or `None` at end of input.
    ///
    /// Dictionary records encountered along the way update the decoder's
    /// dictionary cache and are not surfaced.
    pub fn next_value(&mut self) -> Result<Option<(u64, Value)>, ParseError> {
        loop {
            let mut handler = StreamHandler {
                dicts: &mut self.dicts,
                header: &mut self.header,
                require_header: self.require_header,
                produced: None,
            };
            let more = RecordParser::new(&mut self.source, &mut handler).parse_record()?;
            if let Some(produced) = handler.produced {
                return Ok(Some(produced));
            }
            if !more {
                return Ok(None);
            }
        }
    }

    /// Decode the whole stream, invoking `visit` for each value record.
    pub fn decode_stream<F>(&mut self, mut visit: F) -> Result<(), AuError>
    where
        F: FnMut(u64, Value) -> Result<(), AuError>,
    {
        while let Some((pos, value)) = self.next_value()? {
            visit(pos, value)?;
        }
        Ok(())
    }
}

/// The record handler behind [`Decoder`]: keeps the dictionary cache in sync
/// and builds one value per value record.
struct StreamHandler<'a> {
    dicts: &'a mut DictionaryCache,
    header: &'a mut Option<Header>,
    require_header: bool,
    produced: Option<(u64, Value)>,
}

impl StreamHandler<'_> {
    fn check_header(&self) -> Result<(), ParseError> {
        if self.require_header && self.header.is_none() {
            return Err(ParseError::MissingHeader);
        }
        Ok(())
    }
}

impl<R: RawSource> RecordHandler<R> for StreamHandler<'_> {
    fn on_header(&mut self, _pos: u64, version: u64, metadata: &[u8]) -> Result<(), ParseError> {
        *self.header = Some(Header {
            version,
            metadata: metadata.to_vec(),
        });
        Ok(())
    }

    fn on_dict_clear(&mut self, pos: u64) -> Result<(), ParseError> {
        self.check_header()?;
        self.dicts.begin_epoch(pos);
        Ok(())
    }

    fn on_dict_add(
        &mut self,
        pos: u64,
        backref: u32,
        entries: Vec<Vec<u8>>,
    ) -> Result<(), ParseError> {
        self.check_header()?;
        let target = pos - backref as u64;
        let dict = self
            .dicts
            .find_by_end(target)
            .ok_or(ParseError::UnknownDictionary {
                record: pos,
                target,
            })?;
        dict.extend(pos, entries);
        Ok(())
    }

    fn on_value(
        &mut self,
        pos: u64,
        backref: u32,
        _len: u64,
        source: &mut ByteSource<R>,
    ) -> Result<(), ParseError> {
        self.check_header()?;
        let dict = self.dicts.resolve(pos, backref)?;
        let mut builder = ValueBuilder::new(dict);
        ValueParser::new(source, &mut builder).parse()?;
        let value = builder
            .finish()
            .ok_or(ParseError::UnexpectedEof(pos))?;
        self.produced = Some((pos, value));
        Ok(())
    }
}
