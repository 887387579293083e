//! Frame-level record parser.
//!
//! A record is a leading marker (`H`, `C`, `A`, `V`), a kind-specific
//! payload, and the terminator `E` `\n`. Records are self-delimited; value
//! records additionally declare their payload length, which is verified
//! against the bytes the handler actually consumed.

use crate::error::ParseError;
use crate::marker;
use crate::source::{ByteSource, RawSource};

use super::{
    expect_byte, expect_record_end, next_or_eof, parse_inline_string, read_u32_le, read_varint,
    read_version, RecordHandler,
};

/// Parses framed records from a byte source, delivering them to a
/// [`RecordHandler`].
pub struct RecordParser<'a, R, H> {
    source: &'a mut ByteSource<R>,
    handler: &'a mut H,
}

impl<'a, R: RawSource, H: RecordHandler<R>> RecordParser<'a, R, H> {
    pub fn new(source: &'a mut ByteSource<R>, handler: &'a mut H) -> Self {
        Self { source, handler }
    }

    /// Parse records until end of input.
    pub fn parse_stream(&mut self) -> Result<(), ParseError> {
        while self.parse_record()? {}
        self.handler.on_stream_end()
    }

    /// Parse a single record. Returns `false` at end of input.
    pub fn parse_record(&mut self) -> Result<bool, ParseError> {
        if self.source.peek()?.is_none() {
            return Ok(false);
        }
        self.record()?;
        Ok(true)
    }

    fn record(&mut self) -> Result<(), ParseError> {
        let sor = self.source.pos();
        let byte = next_or_eof(self.source)?;
        self.handler.on_record_start(sor)?;
        match byte {
            marker::HEADER => self.header(sor),
            marker::DICT_CLEAR => {
                read_version(self.source)?;
                expect_record_end(self.source)?;
                self.handler.on_dict_clear(sor)
            }
            marker::DICT_ADD => self.dict_add(sor),
            marker::VALUE => self.value(sor),
            _ => Err(ParseError::UnexpectedByte {
                offset: sor,
                byte,
                expected: "a record marker ('H', 'C', 'A' or 'V')",
            }),
        }
    }

    fn header(&mut self, sor: u64) -> Result<(), ParseError> {
        expect_byte(self.source, marker::HEADER_MAGIC[0], "'A' of the header magic")?;
        expect_byte(self.source, marker::HEADER_MAGIC[1], "'U' of the header magic")?;
        let version = read_version(self.source)?;
        let metadata_end = self
            .source
            .pos()
            .saturating_add(marker::MAX_METADATA_SIZE as u64 + 16);
        let metadata =
            parse_inline_string(self.source, Some(metadata_end)).map_err(|e| match e {
                ParseError::StringTooLong { len, .. } => ParseError::MetadataTooLarge {
                    len,
                    max: marker::MAX_METADATA_SIZE,
                },
                other => other,
            })?;
        if metadata.len() > marker::MAX_METADATA_SIZE {
            return Err(ParseError::MetadataTooLarge {
                len: metadata.len() as u64,
                max: marker::MAX_METADATA_SIZE,
            });
        }
        expect_record_end(self.source)?;
        self.handler.on_header(sor, version, &metadata)
    }

    fn dict_add(&mut self, sor: u64) -> Result<(), ParseError> {
        let backref = read_u32_le(self.source)?;
        if backref as u64 > sor || backref == 0 {
            return Err(ParseError::BadBackref {
                offset: sor,
                backref: backref as u64,
            });
        }
        let mut entries = Vec::new();
        loop {
            let byte = self
                .source
                .peek()?
                .ok_or_else(|| ParseError::UnexpectedEof(self.source.pos()))?;
            if byte == marker::RECORD_END {
                break;
            }
            entries.push(parse_inline_string(self.source, None)?);
        }
        expect_record_end(self.source)?;
        self.handler.on_dict_add(sor, backref, entries)
    }

    fn value(&mut self, sor: u64) -> Result<(), ParseError> {
        let backref = read_u32_le(self.source)?;
        if backref as u64 > sor || backref == 0 {
            return Err(ParseError::BadBackref {
                offset: sor,
                backref: backref as u64,
            });
        }
        let declared = read_varint(self.source)?;
        // The declared length covers the value bytes plus the terminator.
        if declared < 2 {
            return Err(ParseError::LengthMismatch {
                declared,
                consumed: 0,
            });
        }
        let sov = self.source.pos();
        self.handler
            .on_value(sor, backref, declared - 2, self.source)?;
        expect_record_end(self.source)?;
        let consumed = self.source.pos() - sov;
        if consumed != declared {
            return Err(ParseError::LengthMismatch { declared, consumed });
        }
        Ok(())
    }
}
