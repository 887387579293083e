//! Buffered, seekable, optionally-tailing byte cursor.
//!
//! `ByteSource` layers a single working buffer over a [`RawSource`] and is
//! the only view of the stream the parsers see. It keeps a slice of consumed
//! history in the buffer so that the short backward seeks the decoder needs
//! (backref checks, resync retries) cost no I/O, and in follow mode it polls
//! the underlying source instead of reporting EOF.

use std::time::Duration;

use crate::error::SourceError;

use super::traits::{FileSource, MemorySource, RawSource, StdinSource};

/// Default working buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// How long a follow-mode read sleeps before polling again.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A buffered cursor over an append-only byte stream.
///
/// Invariant: the absolute offset of the first buffered byte is always
/// `pos - cur`, so backward seeks within the buffered window only move the
/// cursor.
pub struct ByteSource<R> {
    inner: R,
    buf: Box<[u8]>,
    /// Cursor index into `buf`.
    cur: usize,
    /// End of valid data in `buf`.
    limit: usize,
    /// Absolute position of the cursor in the underlying stream.
    pos: u64,
    follow: bool,
    /// Consumed bytes to retain across refills for cheap backward seeks.
    min_history: usize,
}

impl ByteSource<FileSource> {
    /// Open a file-backed source with the default buffer size.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SourceError> {
        Ok(Self::new(FileSource::open(path)?))
    }
}

impl ByteSource<StdinSource> {
    /// A source over the process's standard input.
    pub fn stdin() -> Self {
        Self::new(StdinSource::new())
    }
}

impl ByteSource<MemorySource> {
    /// A source over an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(MemorySource::new(data))
    }
}

impl<R: RawSource> ByteSource<R> {
    /// Wrap `inner` with the default buffer size.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_SIZE)
    }

    /// Wrap `inner` with a working buffer of `capacity` bytes.
    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        let capacity = capacity.max(64);
        Self {
            inner,
            buf: vec![0u8; capacity].into_boxed_slice(),
            cur: 0,
            limit: 0,
            pos: 0,
            follow: false,
            min_history: capacity / 16,
        }
    }

    /// Enable or disable follow mode. When enabled, reads at EOF sleep and
    /// retry instead of reporting end of input.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Absolute position of the cursor in the underlying stream.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Current total size of the underlying stream.
    pub fn end_pos(&self) -> Result<u64, SourceError> {
        self.inner.size()
    }

    /// Consume and return the next byte, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<u8>, SourceError> {
        while self.cur == self.limit {
            if !self.refill()? {
                return Ok(None);
            }
        }
        let byte = self.buf[self.cur];
        self.cur += 1;
        self.pos += 1;
        Ok(Some(byte))
    }

    /// Return the next byte without consuming it, or `None` at end of input.
    pub fn peek(&mut self) -> Result<Option<u8>, SourceError> {
        while self.cur == self.limit {
            if !self.refill()? {
                return Ok(None);
            }
        }
        Ok(Some(self.buf[self.cur]))
    }

    /// Consume and return the next contiguous run of buffered bytes, at most
    /// `max` long. Returns an empty slice at end of input.
    ///
    /// Large reads arrive as a sequence of chunks; each returned slice is
    /// valid only until the next call on this source.
    pub fn read_chunk(&mut self, max: usize) -> Result<&[u8], SourceError> {
        if max == 0 {
            return Ok(&[]);
        }
        while self.cur == self.limit {
            if !self.refill()? {
                return Ok(&[]);
            }
        }
        let n = (self.limit - self.cur).min(max);
        let start = self.cur;
        self.cur += n;
        self.pos += n as u64;
        Ok(&self.buf[start..start + n])
    }

    /// Fill `dst` exactly, failing with [`SourceError::Truncated`] if the
    /// stream ends first.
    pub fn read_exact_into(&mut self, dst: &mut [u8]) -> Result<(), SourceError> {
        let mut filled = 0;
        while filled < dst.len() {
            let wanted = dst.len() - filled;
            let offset = self.pos;
            let chunk = self.read_chunk(wanted)?;
            if chunk.is_empty() {
                return Err(SourceError::Truncated { wanted, offset });
            }
            dst[filled..filled + chunk.len()].copy_from_slice(chunk);
            filled += chunk.len();
        }
        Ok(())
    }

    /// Skip exactly `len` bytes, failing with [`SourceError::Truncated`] if
    /// the stream ends first.
    pub fn skip(&mut self, mut len: u64) -> Result<(), SourceError> {
        while len > 0 {
            let avail = (self.limit - self.cur) as u64;
            if avail == 0 {
                if !self.refill()? {
                    return Err(SourceError::Truncated {
                        wanted: len.min(usize::MAX as u64) as usize,
                        offset: self.pos,
                    });
                }
                continue;
            }
            let step = avail.min(len) as usize;
            self.cur += step;
            self.pos += step as u64;
            len -= step as u64;
        }
        Ok(())
    }

    /// Seek to the absolute offset `target`.
    ///
    /// Positions inside the buffered window (including retained history) are
    /// reached by moving the cursor. Anything else repositions the underlying
    /// source and resets the buffer; on unseekable sources, forward seeks
    /// fall back to reading and discarding.
    pub fn seek(&mut self, target: u64) -> Result<(), SourceError> {
        let buf_start = self.pos - self.cur as u64;
        let buf_end = self.pos + (self.limit - self.cur) as u64;
        if target >= buf_start && target <= buf_end {
            self.cur = (target - buf_start) as usize;
            self.pos = target;
            return Ok(());
        }
        match self.inner.seek(target) {
            Ok(new_pos) => {
                self.cur = 0;
                self.limit = 0;
                self.pos = new_pos;
                Ok(())
            }
            Err(SourceError::Unseekable) if target > self.pos => self.skip(target - self.pos),
            Err(e) => Err(e),
        }
    }

    /// Forward-scan for the literal byte sequence `needle`, leaving the
    /// cursor on its first byte.
    ///
    /// Returns `false` at end of input. The scan consumes at most
    /// `len(needle) - 1` fewer bytes than it has examined, so a needle
    /// straddling a buffer refill is still found, and on failure the cursor
    /// stops within the final partial-match window.
    pub fn seek_to(&mut self, needle: &[u8]) -> Result<bool, SourceError> {
        if needle.is_empty() {
            return Ok(true);
        }
        loop {
            let window = &self.buf[self.cur..self.limit];
            if let Some(off) = find(window, needle) {
                self.cur += off;
                self.pos += off as u64;
                return Ok(true);
            }
            let avail = self.limit - self.cur;
            let consume = avail.saturating_sub(needle.len() - 1);
            self.cur += consume;
            self.pos += consume as u64;
            if !self.refill()? {
                return Ok(false);
            }
        }
    }

    /// Seek to `len` bytes before the end of the stream (or to the start, if
    /// the stream is shorter).
    pub fn tail(&mut self, len: u64) -> Result<(), SourceError> {
        let end = self.inner.size()?;
        self.seek(end.saturating_sub(len))
    }

    /// Refill the buffer, retaining up to `min_history` consumed bytes.
    ///
    /// Returns `false` at end of input. In follow mode an empty read sleeps
    /// and retries indefinitely; dropping the source is the only cancel.
    fn refill(&mut self) -> Result<bool, SourceError> {
        let keep = self.cur.min(self.min_history);
        let shift = self.cur - keep;
        if shift > 0 {
            self.buf.copy_within(shift..self.limit, 0);
            self.cur -= shift;
            self.limit -= shift;
        }
        debug_assert!(self.limit < self.buf.len(), "no room to refill");
        loop {
            let n = self.inner.read_into(&mut self.buf[self.limit..])?;
            if n > 0 {
                self.limit += n;
                return Ok(true);
            }
            if !self.follow {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_source(data: Vec<u8>) -> ByteSource<MemorySource> {
        // 64 is the minimum capacity; with 4 bytes of retained history it
        // exercises refills and history eviction quickly.
        ByteSource::with_capacity(MemorySource::new(data), 64)
    }

    #[test]
    fn test_next_and_peek() {
        let mut src = tiny_source(vec![10, 20, 30]);
        assert_eq!(src.peek().unwrap(), Some(10));
        assert_eq!(src.next().unwrap(), Some(10));
        assert_eq!(src.pos(), 1);
        assert_eq!(src.next().unwrap(), Some(20));
        assert_eq!(src.next().unwrap(), Some(30));
        assert_eq!(src.next().unwrap(), None);
        assert_eq!(src.peek().unwrap(), None);
        assert_eq!(src.pos(), 3);
    }

    #[test]
    fn test_read_exact_across_refills() {
        let data: Vec<u8> = (0..=255).collect();
        let mut src = tiny_source(data.clone());
        let mut out = vec![0u8; 256];
        src.read_exact_into(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(src.pos(), 256);
    }

    #[test]
    fn test_read_exact_truncated() {
        let mut src = tiny_source(vec![1, 2, 3]);
        let mut out = [0u8; 8];
        let err = src.read_exact_into(&mut out).unwrap_err();
        assert!(matches!(err, SourceError::Truncated { offset: 3, .. }));
    }

    #[test]
    fn test_skip_and_truncated_skip() {
        let data: Vec<u8> = (0..200).collect();
        let mut src = tiny_source(data);
        src.skip(150).unwrap();
        assert_eq!(src.pos(), 150);
        assert_eq!(src.next().unwrap(), Some(150));
        assert!(matches!(src.skip(1000), Err(SourceError::Truncated { .. })));
    }

    #[test]
    fn test_backward_seek_within_history_is_buffered() {
        let data: Vec<u8> = (0..=255).collect();
        let mut src = tiny_source(data);
        src.skip(100).unwrap();
        // History retention is capacity/16 = 4 bytes; 2 back is buffered.
        src.seek(98).unwrap();
        assert_eq!(src.pos(), 98);
        assert_eq!(src.next().unwrap(), Some(98));
    }

    #[test]
    fn test_backward_seek_beyond_history_repositions() {
        let data: Vec<u8> = (0..=255).collect();
        let mut src = tiny_source(data);
        src.skip(200).unwrap();
        src.seek(5).unwrap();
        assert_eq!(src.next().unwrap(), Some(5));
    }

    #[test]
    fn test_forward_seek_re_reads() {
        let data: Vec<u8> = (0..=255).collect();
        let mut src = tiny_source(data);
        src.seek(250).unwrap();
        assert_eq!(src.next().unwrap(), Some(250));
    }

    #[test]
    fn test_seek_to_finds_needle_across_refills() {
        // Place the needle so it straddles the 64-byte refill boundary.
        let mut data = vec![0u8; 200];
        data[62] = b'E';
        data[63] = b'\n';
        data[64] = b'V';
        let mut src = tiny_source(data);
        assert!(src.seek_to(b"E\nV").unwrap());
        assert_eq!(src.pos(), 62);
        assert_eq!(src.next().unwrap(), Some(b'E'));
    }

    #[test]
    fn test_seek_to_missing_needle() {
        let mut src = tiny_source(vec![0u8; 300]);
        assert!(!src.seek_to(b"E\nV").unwrap());
        // The cursor stops within the final partial-match window.
        assert!(src.pos() >= 298);
    }

    #[test]
    fn test_seek_to_repeated_prefixes() {
        // "E\nE\nV": the first "E\n" is a false start.
        let mut data = vec![b'x'; 50];
        data.extend_from_slice(b"E\nE\nV");
        let mut src = tiny_source(data);
        assert!(src.seek_to(b"E\nV").unwrap());
        assert_eq!(src.pos(), 52);
    }

    #[test]
    fn test_tail_and_end_pos() {
        let data: Vec<u8> = (0..100).collect();
        let mut src = tiny_source(data);
        assert_eq!(src.end_pos().unwrap(), 100);
        src.tail(10).unwrap();
        assert_eq!(src.pos(), 90);
        assert_eq!(src.next().unwrap(), Some(90));
        // Longer than the stream: clamp to the start.
        src.tail(1000).unwrap();
        assert_eq!(src.pos(), 0);
    }

    #[test]
    fn test_read_chunk_bounds() {
        let mut src = tiny_source(vec![1, 2, 3, 4]);
        let chunk = src.read_chunk(2).unwrap();
        assert_eq!(chunk, &[1, 2]);
        let chunk = src.read_chunk(100).unwrap();
        assert_eq!(chunk, &[3, 4]);
        assert!(src.read_chunk(1).unwrap().is_empty());
    }
}
