//! File-backed streams.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{InStream, OutStream, StreamProps};
use crate::property::attributes;
use crate::{Error, Result, Timestamp};

/// Input stream over an open file.
#[derive(Debug)]
pub struct FileInStream {
    file: File,
    path: PathBuf,
}

impl FileInStream {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io_at(e, path))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the stream was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FileInStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileInStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl InStream for FileInStream {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn props(&mut self) -> io::Result<StreamProps> {
        let meta = self.file.metadata()?;
        Ok(metadata_props(&meta))
    }
}

/// Converts file-system metadata into stream properties.
pub(crate) fn metadata_props(meta: &std::fs::Metadata) -> StreamProps {
    let time = |t: io::Result<std::time::SystemTime>| t.ok().and_then(Timestamp::from_system_time);
    StreamProps {
        size: if meta.is_dir() { 0 } else { meta.len() },
        created: time(meta.created()),
        accessed: time(meta.accessed()),
        modified: time(meta.modified()),
        attributes: metadata_attributes(meta),
    }
}

fn metadata_attributes(meta: &std::fs::Metadata) -> u32 {
    let mut windows = if meta.is_dir() {
        attributes::DIRECTORY
    } else {
        attributes::ARCHIVE
    };
    if meta.permissions().readonly() {
        windows |= attributes::READONLY;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        attributes::with_unix_mode(windows, meta.permissions().mode())
    }
    #[cfg(not(unix))]
    {
        windows
    }
}

/// Output stream over a file opened for writing.
#[derive(Debug)]
pub struct FileOutStream {
    file: File,
    path: PathBuf,
}

impl FileOutStream {
    /// Creates `path`, truncating an existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), true)
    }

    /// Opens `path` for writing without truncating, creating it if missing.
    ///
    /// The cursor starts at the end of the existing content.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let mut stream = Self::open_with(path.as_ref(), false)?;
        stream
            .file
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io_at(e, &stream.path))?;
        Ok(stream)
    }

    fn open_with(path: &Path, truncate: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(truncate)
            .open(path)
            .map_err(|e| Error::io_at(e, path))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the stream writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes data and metadata to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

impl Write for FileOutStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileOutStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl OutStream for FileOutStream {
    fn set_size(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)?;
        if self.file.stream_position()? > size {
            self.file.seek(SeekFrom::Start(size))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileInStream::open(dir.path().join("absent.bin")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileNotFound);
        assert!(err.to_string().contains("absent.bin"));
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        {
            let mut out = FileOutStream::create(&path).unwrap();
            out.write_all(b"0123456789").unwrap();
            out.set_size(4).unwrap();
            out.write_all(b"ab").unwrap();
            out.sync().unwrap();
        }
        let mut input = FileInStream::open(&path).unwrap();
        assert_eq!(input.size().unwrap(), 6);
        let props = input.props().unwrap();
        assert_eq!(props.size, 6);
        assert!(props.modified.is_some());
        assert_eq!(props.attributes & attributes::DIRECTORY, 0);
        let mut text = String::new();
        input.read_to_string(&mut text).unwrap();
        assert_eq!(text, "0123ab");
    }

    #[test]
    fn append_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, b"one").unwrap();
        {
            let mut out = FileOutStream::append(&path).unwrap();
            out.write_all(b"two").unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"onetwo");
    }
}
