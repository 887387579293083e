//! RawSource trait definition and the concrete sources.
//!
//! Provides a unified synchronous interface for pulling bytes from a file,
//! stdin, or an in-memory buffer. The buffered cursor logic lives in
//! [`super::byte_source::ByteSource`]; implementations here only move bytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::SourceError;

/// Abstraction over the byte streams the codec can read.
///
/// A `RawSource` is a plain cursor: it reads forward and, when the medium
/// allows it, repositions to an absolute offset. Buffering, peeking and
/// history retention are layered above in `ByteSource`.
pub trait RawSource {
    /// Read up to `buf.len()` bytes, returning how many were read.
    ///
    /// A return of 0 means the source is (currently) at end of input; for a
    /// growing file, later calls may return data again.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Reposition to the absolute offset `pos`, returning the new position.
    ///
    /// # Errors
    /// Returns [`SourceError::Unseekable`] for sources that cannot seek.
    fn seek(&mut self, pos: u64) -> Result<u64, SourceError>;

    /// Current total size of the underlying stream, in bytes.
    ///
    /// For a file this is live (it reflects growth since open); sources
    /// without a knowable size return [`SourceError::UnknownSize`].
    fn size(&self) -> Result<u64, SourceError>;
}

impl RawSource for Box<dyn RawSource> {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        (**self).read_into(buf)
    }

    fn seek(&mut self, pos: u64) -> Result<u64, SourceError> {
        (**self).seek(pos)
    }

    fn size(&self) -> Result<u64, SourceError> {
        (**self).size()
    }
}

/// A source reading from a file on the local filesystem.
pub struct FileSource {
    file: File,
    path: PathBuf,
}

impl FileSource {
    /// Open a file for reading.
    ///
    /// # Errors
    /// Returns [`SourceError::NotFound`] if the file doesn't exist,
    /// [`SourceError::PermissionDenied`] if access is denied, and
    /// [`SourceError::Open`] for other I/O errors, keeping the path for
    /// error reporting.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => {
                SourceError::PermissionDenied(path.display().to_string())
            }
            _ => SourceError::Open {
                path: path.display().to_string(),
                source,
            },
        })?;
        Ok(Self { file, path })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawSource for FileSource {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        Ok(self.file.read(buf)?)
    }

    fn seek(&mut self, pos: u64) -> Result<u64, SourceError> {
        self.file
            .seek(SeekFrom::Start(pos))
            .map_err(|source| SourceError::Seek { offset: pos, source })
    }

    fn size(&self) -> Result<u64, SourceError> {
        Ok(self.file.metadata().map_err(SourceError::Io)?.len())
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource").field("path", &self.path).finish()
    }
}

/// A source reading from standard input. Cannot seek and has no size.
#[derive(Debug)]
pub struct StdinSource {
    stdin: io::Stdin,
}

impl StdinSource {
    /// Wrap the process's standard input.
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSource for StdinSource {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        Ok(self.stdin.lock().read(buf)?)
    }

    fn seek(&mut self, _pos: u64) -> Result<u64, SourceError> {
        Err(SourceError::Unseekable)
    }

    fn size(&self) -> Result<u64, SourceError> {
        Err(SourceError::UnknownSize)
    }
}

/// An in-memory source over an owned byte buffer.
///
/// Useful for tests and for decoding streams that were just encoded.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: u64,
}

impl MemorySource {
    /// Wrap a byte buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl RawSource for MemorySource {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let start = self.pos.min(self.data.len() as u64) as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> Result<u64, SourceError> {
        self.pos = pos;
        Ok(pos)
    }

    fn size(&self) -> Result<u64, SourceError> {
        Ok(self.data.len() as u64)
    }
}
