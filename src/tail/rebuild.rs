//! Dictionary reconstruction by walking backref chains backward.
//!
//! Starting from the dict record a value's backref names, the builder reads
//! each dict-add, prepends its strings so the accumulated list stays in wire
//! order, and follows the backref to the previous anchor — stopping early
//! when the chain reaches a dict already in the cache, or at the dict-clear
//! that began the epoch. The cost is proportional to the epoch, never to
//! the file.

use crate::dictionary::DictionaryCache;
use crate::error::ParseError;
use crate::marker;
use crate::parser::{expect_record_end, next_or_eof, parse_inline_string, read_u32_le, read_version};
use crate::source::{ByteSource, RawSource};

pub(crate) struct DictBuilder {
    /// Entries gathered so far, in wire order.
    new_entries: Vec<Vec<u8>>,
    /// Everything on the chain must end before this position (the value
    /// record being validated); bounds string lengths during the walk.
    end_of_dict: u64,
    /// Where the walk began: the most recent dict record of the chain, which
    /// becomes the rebuilt dict's end position.
    walk_start: u64,
}

impl DictBuilder {
    pub(crate) fn new(walk_start: u64, end_of_dict: u64) -> Self {
        Self {
            new_entries: Vec::new(),
            end_of_dict,
            walk_start,
        }
    }

    /// Walk the chain from the current source position (which must be
    /// `walk_start`) and install a complete dict into `dicts`.
    pub(crate) fn build<R: RawSource>(
        mut self,
        source: &mut ByteSource<R>,
        dicts: &mut DictionaryCache,
    ) -> Result<(), ParseError> {
        loop {
            // Each iteration stands at a dict record that is not part of any
            // cached dict; the dict-add branch re-establishes the invariant
            // before following the chain.
            let sor = source.pos();
            let byte = next_or_eof(source)?;
            match byte {
                marker::DICT_ADD => {
                    let backref = read_u32_le(source)?;
                    let target = sor
                        .checked_sub(backref as u64)
                        .filter(|_| backref != 0)
                        .ok_or(ParseError::BadBackref {
                            offset: sor,
                            backref: backref as u64,
                        })?;

                    let mut batch = Vec::new();
                    loop {
                        let next = source
                            .peek()?
                            .ok_or_else(|| ParseError::UnexpectedEof(source.pos()))?;
                        if next == marker::RECORD_END {
                            break;
                        }
                        batch.push(parse_inline_string(source, Some(self.end_of_dict))?);
                    }
                    expect_record_end(source)?;

                    // This record precedes everything gathered so far.
                    batch.append(&mut self.new_entries);
                    self.new_entries = batch;

                    if let Some(dict) = dicts.find_by_end(target) {
                        // The chain reached known territory: splice.
                        dict.extend(self.walk_start, self.new_entries.drain(..));
                        return Ok(());
                    }
                    source.seek(target)?;
                }
                marker::DICT_CLEAR => {
                    read_version(source)?;
                    expect_record_end(source)?;
                    let walk_start = self.walk_start;
                    let entries: Vec<_> = self.new_entries.drain(..).collect();
                    let dict = dicts.begin_epoch(sor);
                    if !entries.is_empty() {
                        dict.extend(walk_start, entries);
                    }
                    return Ok(());
                }
                other => {
                    return Err(ParseError::DictRebuild(format!(
                        "expected a dictionary record at offset {sor}, found byte 0x{other:02x}"
                    )))
                }
            }
        }
    }
}
