//! Resynchronization: locating a valid value record from an arbitrary
//! offset.
//!
//! The scanner looks for the `{E, \n, V}` byte sequence that separates a
//! record from a following value record, then speculatively validates the
//! candidate: backref sanity, a (possibly rebuilt) dictionary, and a full
//! value parse under a validating handler that refuses to read past the
//! record's declared end. Any non-I/O failure just advances the scan one
//! byte and tries again.

use tracing::debug;

use crate::decoder::Decoder;
use crate::dictionary::Dict;
use crate::error::ParseError;
use crate::marker;
use crate::parser::{
    expect_byte, expect_record_end, read_u32_le, read_varint, ValueHandler, ValueParser,
};
use crate::source::RawSource;

use super::rebuild::DictBuilder;

/// A no-op value handler with bounds and dictionary-range checks, used for
/// speculative parses so a bogus candidate cannot consume unbounded memory
/// or time before being rejected.
struct ValidatingHandler<'d> {
    dict: &'d Dict,
    /// Absolute end of the candidate record (start of value + declared
    /// length).
    value_end: u64,
    /// Read position within the string currently being streamed.
    string_pos: u64,
}

impl ValidatingHandler<'_> {
    fn check(&self, pos: u64) -> Result<(), ParseError> {
        if pos > self.value_end {
            return Err(ParseError::ValueOverrun {
                offset: pos,
                end: self.value_end,
            });
        }
        Ok(())
    }
}

impl ValueHandler for ValidatingHandler<'_> {
    fn on_null(&mut self, pos: u64) -> Result<(), ParseError> {
        self.check(pos)
    }

    fn on_bool(&mut self, pos: u64, _value: bool) -> Result<(), ParseError> {
        self.check(pos)
    }

    fn on_int(&mut self, pos: u64, _value: i64) -> Result<(), ParseError> {
        self.check(pos)
    }

    fn on_uint(&mut self, pos: u64, _value: u64) -> Result<(), ParseError> {
        self.check(pos)
    }

    fn on_double(&mut self, pos: u64, _value: f64) -> Result<(), ParseError> {
        self.check(pos)
    }

    fn on_time(&mut self, pos: u64, _nanos: u64) -> Result<(), ParseError> {
        self.check(pos)
    }

    fn on_dict_ref(&mut self, pos: u64, index: u64) -> Result<(), ParseError> {
        if index >= self.dict.len() as u64 {
            return Err(ParseError::DictRefOutOfRange {
                offset: pos,
                index,
                len: self.dict.len(),
            });
        }
        self.check(pos)
    }

    fn on_string_start(&mut self, pos: u64, len: u64) -> Result<(), ParseError> {
        // `pos` is the payload start, so this bounds the whole string before
        // a single byte of it is read.
        if pos.saturating_add(len) > self.value_end {
            return Err(ParseError::StringTooLong { offset: pos, len });
        }
        self.string_pos = pos;
        self.check(pos)
    }

    fn on_string_fragment(&mut self, fragment: &[u8]) -> Result<(), ParseError> {
        self.string_pos += fragment.len() as u64;
        self.check(self.string_pos)
    }
}

impl<R: RawSource> Decoder<R> {
    /// Scan forward from the current position for the start of a valid
    /// value record, rebuilding dictionary context as needed.
    ///
    /// On success the source is left positioned at the record's first byte
    /// and normal decoding can resume. Returns `false` when the stream ends
    /// without a validated candidate. Only I/O failures are errors;
    /// malformed candidates are skipped.
    pub fn sync(&mut self) -> Result<bool, ParseError> {
        const NEEDLE: [u8; 3] = [marker::RECORD_END, b'\n', marker::VALUE];
        loop {
            match self.source.seek_to(&NEEDLE) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
            let sor = self.source.pos() + 2;
            match self.validate_candidate(sor) {
                Ok(()) => {
                    self.source.seek(sor)?;
                    return Ok(true);
                }
                Err(e) if e.is_io() => return Err(e),
                Err(e) => {
                    debug!(offset = sor, error = %e, "resync candidate rejected");
                    self.source.seek(sor + 1)?;
                }
            }
        }
    }

    /// Validate the value-record candidate starting at `sor`; the cursor
    /// sits on the terminator of the preceding record.
    fn validate_candidate(&mut self, sor: u64) -> Result<(), ParseError> {
        expect_record_end(&mut self.source)?;
        expect_byte(&mut self.source, marker::VALUE, "value record marker")?;
        let backref = read_u32_le(&mut self.source)?;
        let target = sor
            .checked_sub(backref as u64)
            .filter(|_| backref != 0)
            .ok_or(ParseError::BadBackref {
                offset: sor,
                backref: backref as u64,
            })?;

        if self.dicts.find_by_end(target).is_none() {
            self.source.seek(target)?;
            DictBuilder::new(target, sor).build(&mut self.source, &mut self.dicts)?;
            // Back to the candidate; the bytes must read the same way.
            self.source.seek(sor)?;
            expect_byte(&mut self.source, marker::VALUE, "value record marker")?;
            let reread = read_u32_le(&mut self.source)?;
            if reread != backref {
                return Err(ParseError::DictRebuild(
                    "candidate backref changed between reads".into(),
                ));
            }
        }

        let declared = read_varint(&mut self.source)?;
        if declared < 2 {
            return Err(ParseError::LengthMismatch {
                declared,
                consumed: 0,
            });
        }
        let sov = self.source.pos();

        let dict = self.dicts.resolve(sor, backref)?;
        let mut validator = ValidatingHandler {
            dict,
            value_end: sov + declared,
            string_pos: sov,
        };
        ValueParser::new(&mut self.source, &mut validator).parse()?;
        expect_record_end(&mut self.source)?;

        let consumed = self.source.pos() - sov;
        if consumed != declared {
            return Err(ParseError::LengthMismatch { declared, consumed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictionaryCache;

    #[test]
    fn test_string_bound_uses_payload_start() {
        let mut dicts = DictionaryCache::new();
        let dict = dicts.begin_epoch(0);
        let mut validator = ValidatingHandler {
            dict,
            value_end: 10,
            string_pos: 0,
        };
        // Ends exactly at the declared end: fine.
        assert!(validator.on_string_start(7, 3).is_ok());
        // One byte past the end is rejected up front, regardless of how
        // wide the marker and length header were.
        assert!(matches!(
            validator.on_string_start(8, 3),
            Err(ParseError::StringTooLong { offset: 8, len: 3 })
        ));
    }

    #[test]
    fn test_string_fragments_are_checked_incrementally() {
        let mut dicts = DictionaryCache::new();
        let dict = dicts.begin_epoch(0);
        let mut validator = ValidatingHandler {
            dict,
            value_end: 10,
            string_pos: 0,
        };
        validator.on_string_start(6, 4).unwrap();
        assert!(validator.on_string_fragment(b"ab").is_ok());
        assert!(validator.on_string_fragment(b"cd").is_ok());
        assert!(matches!(
            validator.on_string_fragment(b"e"),
            Err(ParseError::ValueOverrun { offset: 11, end: 10 })
        ));
    }

    #[test]
    fn test_dict_refs_must_be_in_range() {
        let mut dicts = DictionaryCache::new();
        let dict = dicts.begin_epoch(0);
        dict.extend(5, vec![b"the only entry".to_vec()]);
        let mut validator = ValidatingHandler {
            dict,
            value_end: 100,
            string_pos: 0,
        };
        assert!(validator.on_dict_ref(20, 0).is_ok());
        assert!(matches!(
            validator.on_dict_ref(21, 1),
            Err(ParseError::DictRefOutOfRange { index: 1, len: 1, .. })
        ));
    }
}
