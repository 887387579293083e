//! The Au encoder: record framing, dictionary deltas, and periodic
//! dictionary maintenance.

mod writer;

pub use writer::ValueWriter;

use std::io::Write;

use tracing::debug;

use crate::error::EncodeError;
use crate::intern::{StringIntern, INTERN_CACHE_SIZE, INTERN_THRESH, TINY_STRING_SIZE};
use crate::marker;
use crate::varint::encode_varint;

use self::writer::{write_inline_string, write_record_end};

/// Clear the dictionary once this much output separates a record from its
/// dictionary anchor, well before the 32-bit backref range runs out.
const BACKREF_GUARD: u64 = (u32::MAX / 2) as u64;

/// Tuning for an [`Encoder`].
///
/// The defaults match the maintenance cadence the format was designed
/// around; `0` disables an interval.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Free-form metadata written into the header record. Truncated to
    /// [`marker::MAX_METADATA_SIZE`] bytes.
    pub metadata: String,
    /// Purge the dictionary after this many records (0 = never).
    pub purge_interval: u64,
    /// Entries observed fewer than this many times are dropped by a purge
    /// or reindex.
    pub purge_threshold: u64,
    /// Reindex the dictionary after this many records (0 = never). A
    /// reindex implies a purge.
    pub reindex_interval: u64,
    /// Clear the dictionary when it grows past this many entries.
    pub clear_threshold: usize,
    /// Strings of this length or shorter are never interned.
    pub tiny_string_size: usize,
    /// Occurrences required before a string graduates to the dictionary.
    pub intern_threshold: u64,
    /// Distinct strings the usage tracker observes at once.
    pub intern_cache_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            metadata: String::new(),
            purge_interval: 250_000,
            purge_threshold: 50,
            reindex_interval: 500_000,
            clear_threshold: 1400,
            tiny_string_size: TINY_STRING_SIZE,
            intern_threshold: INTERN_THRESH,
            intern_cache_size: INTERN_CACHE_SIZE,
        }
    }
}

/// Streaming encoder for the Au format.
///
/// Each [`Encoder::encode`] call produces exactly one value record,
/// preceded when necessary by a dict-add record carrying the strings that
/// graduated to the dictionary since the last one. The pair is delivered to
/// the sink as a single contiguous write, so a record and its dictionary
/// delta can never be split by a crash of the consumer.
pub struct Encoder {
    intern: StringIntern,
    /// Record framing and dictionary records accumulate here.
    dict_buf: Vec<u8>,
    /// The value payload of the record being encoded.
    value_buf: Vec<u8>,
    /// Bytes from the next record's start back to the last dict record.
    backref: u64,
    last_dict_size: usize,
    records: u64,
    purge_interval: u64,
    purge_threshold: u64,
    reindex_interval: u64,
    clear_threshold: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// An encoder with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EncoderConfig::default())
    }

    /// An encoder with explicit tuning. The header record is staged
    /// immediately and flushed with the first value record.
    pub fn with_config(config: EncoderConfig) -> Self {
        let mut encoder = Self {
            intern: StringIntern::new(
                config.tiny_string_size,
                config.intern_threshold,
                config.intern_cache_size,
            ),
            dict_buf: Vec::with_capacity(1024),
            value_buf: Vec::with_capacity(1024),
            backref: 0,
            last_dict_size: 0,
            records: 0,
            purge_interval: config.purge_interval,
            purge_threshold: config.purge_threshold,
            reindex_interval: config.reindex_interval,
            clear_threshold: config.clear_threshold,
        };

        let mut metadata = config.metadata;
        if metadata.len() > marker::MAX_METADATA_SIZE {
            let mut end = marker::MAX_METADATA_SIZE;
            while !metadata.is_char_boundary(end) {
                end -= 1;
            }
            metadata.truncate(end);
        }

        encoder.dict_buf.push(marker::HEADER);
        encoder.dict_buf.extend_from_slice(&marker::HEADER_MAGIC);
        encoder.dict_buf.push(version_byte());
        write_inline_string(&mut encoder.dict_buf, metadata.as_bytes());
        write_record_end(&mut encoder.dict_buf);
        encoder.emit_dict_clear();
        encoder
    }

    /// Encode one value record.
    ///
    /// `produce` receives a [`ValueWriter`] and emits exactly one value; if
    /// it emits nothing, no record is written and `Ok(0)` is returned.
    /// Otherwise the pending dictionary delta (if any) and the value record
    /// are delivered to `sink` as one write, and the number of bytes written
    /// is returned.
    pub fn encode<F, W>(&mut self, produce: F, sink: &mut W) -> Result<usize, EncodeError>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<(), EncodeError>,
        W: Write,
    {
        let mut writer = ValueWriter::new(&mut self.value_buf, &mut self.intern);
        if let Err(e) = produce(&mut writer) {
            self.value_buf.clear();
            return Err(e);
        }
        if self.value_buf.is_empty() {
            return Ok(0);
        }
        write_record_end(&mut self.value_buf);
        self.finalize(sink)
    }

    /// Drop all dictionary entries and emit a dict-clear record with the
    /// next write. Optionally forgets the usage tracker as well.
    pub fn clear_dictionary(&mut self, reset_tracker: bool) {
        debug!(
            entries = self.intern.len(),
            reset_tracker, "clearing dictionary"
        );
        self.intern.clear(reset_tracker);
        self.emit_dict_clear();
    }

    /// Drop dictionary entries observed fewer than `threshold` times.
    /// Indices of the survivors are preserved, so no dict-clear is needed.
    pub fn purge_dictionary(&mut self, threshold: u64) {
        let purged = self.intern.purge(threshold);
        debug!(purged, threshold, "purged dictionary");
    }

    /// Purge, renumber the survivors hottest-first, and emit a dict-clear so
    /// the reader discards the old index space.
    pub fn reindex_dictionary(&mut self, threshold: u64) {
        let purged = self.intern.reindex(threshold);
        debug!(
            purged,
            threshold,
            kept = self.intern.len(),
            "reindexed dictionary"
        );
        self.emit_dict_clear();
    }

    /// Number of value records encoded so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Number of entries currently in the dictionary.
    pub fn dict_len(&self) -> usize {
        self.intern.len()
    }

    /// Stage a dict-add record covering entries interned since the last
    /// dict record.
    fn export_dict(&mut self) {
        let dict_len = self.intern.len();
        if dict_len <= self.last_dict_size {
            return;
        }
        let sor = self.dict_buf.len();
        self.dict_buf.push(marker::DICT_ADD);
        self.dict_buf
            .extend_from_slice(&(self.backref as u32).to_le_bytes());
        for entry in &self.intern.entries()[self.last_dict_size..] {
            write_inline_string(&mut self.dict_buf, entry.as_bytes());
        }
        write_record_end(&mut self.dict_buf);
        self.backref = (self.dict_buf.len() - sor) as u64;
        self.last_dict_size = dict_len;
    }

    fn finalize<W: Write>(&mut self, sink: &mut W) -> Result<usize, EncodeError> {
        if self.backref > u32::MAX as u64 {
            return Err(EncodeError::BackrefOverflow);
        }
        self.export_dict();
        if self.backref > u32::MAX as u64 {
            return Err(EncodeError::BackrefOverflow);
        }

        let sor = self.dict_buf.len();
        self.dict_buf.push(marker::VALUE);
        self.dict_buf
            .extend_from_slice(&(self.backref as u32).to_le_bytes());
        encode_varint(self.value_buf.len() as u64, &mut self.dict_buf);
        self.backref += (self.dict_buf.len() - sor) as u64;

        self.dict_buf.extend_from_slice(&self.value_buf);
        sink.write_all(&self.dict_buf)?;
        let written = self.dict_buf.len();

        self.records += 1;
        self.backref += self.value_buf.len() as u64;
        self.value_buf.clear();
        self.dict_buf.clear();

        self.maintain();
        Ok(written)
    }

    /// Periodic dictionary maintenance, applied between records so a clear
    /// can never invalidate refs already staged in a value buffer.
    fn maintain(&mut self) {
        if self.reindex_interval != 0 && self.records % self.reindex_interval == 0 {
            self.reindex_dictionary(self.purge_threshold);
        }
        if self.purge_interval != 0
            && self.records % self.purge_interval == 0
            && self.last_dict_size > 0
        {
            self.purge_dictionary(self.purge_threshold);
        }
        if self.last_dict_size > self.clear_threshold {
            self.clear_dictionary(true);
        }
        if self.backref > BACKREF_GUARD {
            self.clear_dictionary(false);
        }
    }

    fn emit_dict_clear(&mut self) {
        self.last_dict_size = 0;
        let sor = self.dict_buf.len();
        self.dict_buf.push(marker::DICT_CLEAR);
        self.dict_buf.push(version_byte());
        write_record_end(&mut self.dict_buf);
        self.backref = (self.dict_buf.len() - sor) as u64;
    }
}

fn version_byte() -> u8 {
    marker::SMALL_POS_BASE | marker::FORMAT_VERSION as u8
}
