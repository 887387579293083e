//! Recursive-descent parser for the value grammar.

use crate::error::ParseError;
use crate::marker;
use crate::source::{ByteSource, RawSource};

use super::{next_or_eof, read_f64_le, read_u64_le, read_varint, ValueHandler};

/// Parses a single value, dispatching on its first byte and delivering
/// events to a [`ValueHandler`].
///
/// Recursion depth is bounded (default 8192); exceeding it fails with
/// [`ParseError::TooDeeplyNested`] rather than exhausting the stack.
pub struct ValueParser<'a, R, H> {
    source: &'a mut ByteSource<R>,
    handler: &'a mut H,
    depth: usize,
    max_depth: usize,
}

impl<'a, R: RawSource, H: ValueHandler> ValueParser<'a, R, H> {
    /// Parser over `source` delivering to `handler`, with the default depth
    /// bound.
    pub fn new(source: &'a mut ByteSource<R>, handler: &'a mut H) -> Self {
        Self {
            source,
            handler,
            depth: 0,
            max_depth: marker::MAX_DEPTH,
        }
    }

    /// Override the depth bound. Used by tests; production streams use the
    /// default.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse exactly one value.
    pub fn parse(mut self) -> Result<(), ParseError> {
        self.value()
    }

    fn value(&mut self) -> Result<(), ParseError> {
        let sov = self.source.pos();
        let byte = next_or_eof(self.source)?;

        if byte & 0x80 != 0 {
            return self
                .handler
                .on_dict_ref(sov, (byte & !marker::SHORT_DICT_REF_BASE) as u64);
        }

        match byte {
            marker::TRUE => self.handler.on_bool(sov, true),
            marker::FALSE => self.handler.on_bool(sov, false),
            marker::NULL => self.handler.on_null(sov),
            marker::VARINT => {
                let value = read_varint(self.source)?;
                self.handler.on_uint(sov, value)
            }
            marker::NEG_VARINT => {
                let magnitude = read_varint(self.source)?;
                if magnitude > 1 << 63 {
                    return Err(ParseError::IntOverflow(sov));
                }
                self.handler.on_int(sov, (magnitude as i64).wrapping_neg())
            }
            marker::POS_INT64 => {
                let value = read_u64_le(self.source)?;
                self.handler.on_uint(sov, value)
            }
            marker::NEG_INT64 => {
                let magnitude = read_u64_le(self.source)?;
                if magnitude > 1 << 63 {
                    return Err(ParseError::IntOverflow(sov));
                }
                self.handler.on_int(sov, (magnitude as i64).wrapping_neg())
            }
            marker::DOUBLE => {
                let value = read_f64_le(self.source)?;
                self.handler.on_double(sov, value)
            }
            marker::TIMESTAMP => {
                let nanos = read_u64_le(self.source)?;
                self.handler.on_time(sov, nanos)
            }
            marker::DICT_REF => {
                let index = read_varint(self.source)?;
                self.handler.on_dict_ref(sov, index)
            }
            marker::STRING => {
                let len = read_varint(self.source)?;
                self.string(len)
            }
            marker::ARRAY_START => self.array(sov),
            marker::OBJECT_START => self.object(sov),
            // Closing delimiters and the record terminator sit inside the
            // small-int ranges but never start a value.
            marker::ARRAY_END | marker::OBJECT_END | marker::RECORD_END => {
                Err(ParseError::UnexpectedByte {
                    offset: sov,
                    byte,
                    expected: "a value",
                })
            }
            _ => match byte & marker::RANGE_MASK {
                marker::SMALL_POS_BASE => {
                    self.handler.on_uint(sov, (byte & marker::SMALL_MASK) as u64)
                }
                marker::SMALL_NEG_BASE => {
                    let magnitude = (byte & marker::SMALL_MASK) as i64;
                    if magnitude == 0 {
                        return Err(ParseError::UnexpectedByte {
                            offset: sov,
                            byte,
                            expected: "a value",
                        });
                    }
                    self.handler.on_int(sov, -magnitude)
                }
                marker::SHORT_STRING_BASE => {
                    self.string((byte & marker::SMALL_MASK) as u64)
                }
                _ => Err(ParseError::UnexpectedByte {
                    offset: sov,
                    byte,
                    expected: "a value",
                }),
            },
        }
    }

    /// Keys are restricted to the string forms: long or short inline string,
    /// varint dict ref, or short dict ref.
    fn key(&mut self) -> Result<(), ParseError> {
        let offset = self.source.pos();
        let byte = self
            .source
            .peek()?
            .ok_or(ParseError::UnexpectedEof(offset))?;
        let is_string_form = byte & 0x80 != 0
            || byte == marker::STRING
            || byte == marker::DICT_REF
            || byte & marker::RANGE_MASK == marker::SHORT_STRING_BASE;
        if is_string_form {
            self.value()
        } else {
            Err(ParseError::UnexpectedByte {
                offset,
                byte,
                expected: "an object key (string form)",
            })
        }
    }

    fn string(&mut self, len: u64) -> Result<(), ParseError> {
        // The marker and length header are already consumed: handlers see
        // the payload's start offset, so a bounds check on `pos + len`
        // covers exactly the bytes still ahead of the cursor.
        let start = self.source.pos();
        self.handler.on_string_start(start, len)?;
        let mut remaining = len;
        while remaining > 0 {
            let offset = self.source.pos();
            let chunk = self
                .source
                .read_chunk(remaining.min(usize::MAX as u64) as usize)?;
            if chunk.is_empty() {
                return Err(ParseError::UnexpectedEof(offset));
            }
            remaining -= chunk.len() as u64;
            self.handler.on_string_fragment(chunk)?;
        }
        self.handler.on_string_end()
    }

    fn array(&mut self, sov: u64) -> Result<(), ParseError> {
        self.enter(sov)?;
        self.handler.on_array_start()?;
        loop {
            let byte = self
                .source
                .peek()?
                .ok_or_else(|| ParseError::UnexpectedEof(self.source.pos()))?;
            if byte == marker::ARRAY_END {
                break;
            }
            self.value()?;
        }
        let _ = self.source.next()?;
        self.depth -= 1;
        self.handler.on_array_end()
    }

    fn object(&mut self, sov: u64) -> Result<(), ParseError> {
        self.enter(sov)?;
        self.handler.on_object_start()?;
        loop {
            let byte = self
                .source
                .peek()?
                .ok_or_else(|| ParseError::UnexpectedEof(self.source.pos()))?;
            if byte == marker::OBJECT_END {
                break;
            }
            self.key()?;
            self.value()?;
        }
        let _ = self.source.next()?;
        self.depth -= 1;
        self.handler.on_object_end()
    }

    fn enter(&mut self, sov: u64) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeeplyNested {
                offset: sov,
                max: self.max_depth,
            });
        }
        Ok(())
    }
}
