//! Marker-level value emission.
//!
//! `ValueWriter` writes one value tree into a record buffer, choosing the
//! smallest wire form for each value and routing strings through the intern
//! table. It never emits a small-form byte that collides with a letter
//! marker; those values fall back to the varint forms so the decoder's
//! dispatch stays unambiguous.

use crate::error::EncodeError;
use crate::intern::StringIntern;
use crate::marker;
use crate::varint::encode_varint;

/// Append `bytes` as an inline string, short form when it fits.
pub(crate) fn write_inline_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() <= marker::MAX_SHORT_STRING {
        buf.push(marker::SHORT_STRING_BASE | bytes.len() as u8);
    } else {
        buf.push(marker::STRING);
        encode_varint(bytes.len() as u64, buf);
    }
    buf.extend_from_slice(bytes);
}

/// Append the record terminator pair.
pub(crate) fn write_record_end(buf: &mut Vec<u8>) {
    buf.push(marker::RECORD_END);
    buf.push(b'\n');
}

/// Writes one value into a per-record buffer.
///
/// Obtained from [`super::Encoder::encode`]; the writer borrows the
/// encoder's value buffer and intern table for the duration of one record.
pub struct ValueWriter<'a> {
    buf: &'a mut Vec<u8>,
    intern: &'a mut StringIntern,
    depth: usize,
}

impl<'a> ValueWriter<'a> {
    pub(crate) fn new(buf: &'a mut Vec<u8>, intern: &'a mut StringIntern) -> Self {
        Self {
            buf,
            intern,
            depth: 0,
        }
    }

    pub fn null(&mut self) {
        self.buf.push(marker::NULL);
    }

    pub fn boolean(&mut self, value: bool) {
        self.buf
            .push(if value { marker::TRUE } else { marker::FALSE });
    }

    /// Encode an unsigned integer in its smallest form.
    pub fn uint(&mut self, value: u64) {
        if let Some(byte) = marker::small_pos_byte(value) {
            self.buf.push(byte);
        } else if value >= marker::FIXED_INT_THRESHOLD {
            self.buf.push(marker::POS_INT64);
            self.buf.extend_from_slice(&value.to_le_bytes());
        } else {
            self.buf.push(marker::VARINT);
            encode_varint(value, self.buf);
        }
    }

    /// Encode a signed integer. Non-negative values take the unsigned forms.
    pub fn int(&mut self, value: i64) {
        if value >= 0 {
            return self.uint(value as u64);
        }
        let magnitude = value.unsigned_abs();
        if let Some(byte) = marker::small_neg_byte(magnitude) {
            self.buf.push(byte);
        } else if magnitude >= marker::FIXED_INT_THRESHOLD {
            self.buf.push(marker::NEG_INT64);
            self.buf.extend_from_slice(&magnitude.to_le_bytes());
        } else {
            self.buf.push(marker::NEG_VARINT);
            encode_varint(magnitude, self.buf);
        }
    }

    /// Encode a double, preserving its exact bit pattern (NaNs included).
    pub fn double(&mut self, value: f64) {
        self.buf.push(marker::DOUBLE);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Encode a timestamp as nanoseconds since the Unix epoch.
    pub fn time_nanos(&mut self, nanos: u64) {
        self.buf.push(marker::TIMESTAMP);
        self.buf.extend_from_slice(&nanos.to_le_bytes());
    }

    /// Encode a calendar timestamp. Dates before the epoch or past the u64
    /// nanosecond range clamp to the range boundary.
    pub fn timestamp(&mut self, when: chrono::DateTime<chrono::Utc>) {
        let nanos = when
            .timestamp_nanos_opt()
            .map(|n| n.max(0) as u64)
            .unwrap_or(u64::MAX);
        self.time_nanos(nanos);
    }

    /// Encode a string, interning it if the usage tracker says it is worth
    /// it.
    pub fn string(&mut self, s: &str) {
        self.string_opts(s, None);
    }

    /// Encode a string with an explicit interning hint: `Some(true)` forces
    /// a dictionary entry (subject to the tiny-string floor), `Some(false)`
    /// forces inlining, `None` defers to the usage tracker.
    pub fn string_opts(&mut self, s: &str, intern: Option<bool>) {
        match self.intern.index_of(s, intern) {
            None => write_inline_string(self.buf, s.as_bytes()),
            Some(index) if index < 0x80 => {
                self.buf
                    .push(marker::SHORT_DICT_REF_BASE | index as u8);
            }
            Some(index) => {
                self.buf.push(marker::DICT_REF);
                encode_varint(index as u64, self.buf);
            }
        }
    }

    /// Encode an object key. Keys are always intern candidates.
    pub fn key(&mut self, key: &str) {
        self.string_opts(key, Some(true));
    }

    pub fn begin_array(&mut self) -> Result<(), EncodeError> {
        self.enter()?;
        self.buf.push(marker::ARRAY_START);
        Ok(())
    }

    pub fn end_array(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.buf.push(marker::ARRAY_END);
    }

    pub fn begin_object(&mut self) -> Result<(), EncodeError> {
        self.enter()?;
        self.buf.push(marker::OBJECT_START);
        Ok(())
    }

    pub fn end_object(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.buf.push(marker::OBJECT_END);
    }

    /// Encode an array whose elements are produced by `f`.
    pub fn array<F>(&mut self, f: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Self) -> Result<(), EncodeError>,
    {
        self.begin_array()?;
        f(self)?;
        self.end_array();
        Ok(())
    }

    /// Encode an object whose entries are produced by `f`.
    pub fn object<F>(&mut self, f: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Self) -> Result<(), EncodeError>,
    {
        self.begin_object()?;
        f(self)?;
        self.end_object();
        Ok(())
    }

    fn enter(&mut self) -> Result<(), EncodeError> {
        self.depth += 1;
        if self.depth > marker::MAX_DEPTH {
            return Err(EncodeError::TooDeeplyNested(marker::MAX_DEPTH));
        }
        Ok(())
    }
}
