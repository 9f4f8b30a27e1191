//! Stream adapters.
//!
//! Format handlers consume input through [`InStream`] and produce output
//! through [`OutStream`]. The adapters in this module present memory buffers,
//! files and split volume sets through those two contracts:
//!
//! - [`MemoryInStream`] reads a borrowed or owned buffer without copying.
//! - [`MemoryOutStream`] grows a shared buffer on demand.
//! - [`FileInStream`] and [`FileOutStream`] wrap native files.
//! - [`VolumeInStream`] concatenates `name.001`, `name.002`, ... into one
//!   logical stream.
//!
//! Seek semantics follow `std::io::Seek`: a seek resulting in a negative
//! position fails with `InvalidInput`, while seeking past the end succeeds
//! and later reads return zero bytes.

mod file;
mod memory;
mod volume;

use std::io::{self, Read, Seek, SeekFrom, Write};

pub use file::{FileInStream, FileOutStream};
pub use memory::{MemoryInStream, MemoryOutStream, SharedBuffer};
pub use volume::{VolumeInStream, split_into_volumes, volume_path};
pub(crate) use volume::split_volume_suffix;

use crate::Timestamp;

/// Metadata describing an input stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProps {
    /// Size in bytes.
    pub size: u64,
    /// Creation time, if known.
    pub created: Option<Timestamp>,
    /// Last access time, if known.
    pub accessed: Option<Timestamp>,
    /// Last modification time, if known.
    pub modified: Option<Timestamp>,
    /// Attribute bits (see [`crate::property::attributes`]).
    pub attributes: u32,
}

/// Random-access input consumed by format handlers.
pub trait InStream: Read + Seek + Send {
    /// Total size in bytes.
    ///
    /// The default implementation seeks to the end and restores the position.
    fn size(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    /// Size, times and attributes of the stream.
    fn props(&mut self) -> io::Result<StreamProps> {
        Ok(StreamProps {
            size: self.size()?,
            ..StreamProps::default()
        })
    }
}

/// Random-access output produced by format handlers.
pub trait OutStream: Write + Seek + Send {
    /// Truncates or zero-extends the stream; the cursor is clamped to the new
    /// size.
    fn set_size(&mut self, size: u64) -> io::Result<()>;
}

impl InStream for Box<dyn InStream> {
    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }

    fn props(&mut self) -> io::Result<StreamProps> {
        (**self).props()
    }
}

impl OutStream for Box<dyn OutStream> {
    fn set_size(&mut self, size: u64) -> io::Result<()> {
        (**self).set_size(size)
    }
}

impl<B: AsRef<[u8]> + Send> InStream for io::Cursor<B> {}

/// Resolves a seek request against a current position and length.
///
/// Results below zero are rejected with `InvalidInput`; results past `len`
/// are allowed.
pub(crate) fn resolve_seek(pos: u64, len: u64, target: SeekFrom) -> io::Result<u64> {
    let (base, offset) = match target {
        SeekFrom::Start(n) => return Ok(n),
        SeekFrom::Current(off) => (pos, off),
        SeekFrom::End(off) => (len, off),
    };
    base.checked_add_signed(offset).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek to a negative or overflowing position",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_seek_origins() {
        assert_eq!(resolve_seek(5, 10, SeekFrom::Start(3)).unwrap(), 3);
        assert_eq!(resolve_seek(5, 10, SeekFrom::Current(-2)).unwrap(), 3);
        assert_eq!(resolve_seek(5, 10, SeekFrom::End(-10)).unwrap(), 0);
        assert_eq!(resolve_seek(5, 10, SeekFrom::End(4)).unwrap(), 14);
    }

    #[test]
    fn resolve_seek_rejects_negative() {
        let err = resolve_seek(5, 10, SeekFrom::Current(-6)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(resolve_seek(0, 10, SeekFrom::End(-11)).is_err());
    }

    #[test]
    fn default_size_restores_position() {
        let mut cursor = io::Cursor::new(vec![1u8, 2, 3, 4]);
        cursor.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(InStream::size(&mut cursor).unwrap(), 4);
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.props().unwrap().size, 4);
    }
}
