//! Byte sources: the raw cursor trait and the buffered view the codec reads.

mod byte_source;
mod traits;

pub use byte_source::{ByteSource, DEFAULT_BUFFER_SIZE};
pub use traits::{FileSource, MemorySource, RawSource, StdinSource};
