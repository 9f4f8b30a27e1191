//! Memory-backed streams.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{InStream, OutStream, StreamProps, resolve_seek};

/// Read-only stream over a buffer.
///
/// `B` may be borrowed (`&[u8]`) or owned (`Vec<u8>`, `Arc<[u8]>`); the data is
/// never copied.
#[derive(Debug, Clone)]
pub struct MemoryInStream<B> {
    data: B,
    pos: u64,
}

impl<B: AsRef<[u8]>> MemoryInStream<B> {
    /// Wraps `data`, positioned at the start.
    pub fn new(data: B) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns the wrapped buffer.
    pub fn into_inner(self) -> B {
        self.data
    }

    fn len(&self) -> u64 {
        self.data.as_ref().len() as u64
    }
}

impl<B: AsRef<[u8]>> Read for MemoryInStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.as_ref();
        let Ok(start) = usize::try_from(self.pos) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<B: AsRef<[u8]>> Seek for MemoryInStream<B> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(self.pos, self.len(), target)?;
        Ok(self.pos)
    }
}

impl<B: AsRef<[u8]> + Send> InStream for MemoryInStream<B> {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.len())
    }

    fn props(&mut self) -> io::Result<StreamProps> {
        Ok(StreamProps {
            size: self.len(),
            ..StreamProps::default()
        })
    }
}

/// Growable byte buffer shared between a [`MemoryOutStream`] and its owner.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().map(|data| data.clone()).unwrap_or_default()
    }

    /// Moves the contents out, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        self.lock().map(|mut data| std::mem::take(&mut *data)).unwrap_or_default()
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.lock().map(|data| data.len()).unwrap_or(0)
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Vec<u8>>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("shared buffer lock poisoned"))
    }
}

/// Output stream writing into a [`SharedBuffer`].
///
/// Writes past the current end grow the buffer; writes inside it overwrite in
/// place. A write after seeking beyond the end zero-fills the gap.
#[derive(Debug, Default)]
pub struct MemoryOutStream {
    buffer: SharedBuffer,
    pos: u64,
}

impl MemoryOutStream {
    /// Creates a stream over a fresh buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream writing into an existing buffer, positioned at the
    /// start.
    pub fn with_buffer(buffer: SharedBuffer) -> Self {
        Self { buffer, pos: 0 }
    }

    /// Handle to the underlying buffer, valid after the stream is dropped.
    pub fn buffer(&self) -> SharedBuffer {
        self.buffer.clone()
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Consumes the stream and returns the written bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer.take()
    }
}

fn to_usize(n: u64) -> io::Result<usize> {
    usize::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "position exceeds address space"))
}

impl Write for MemoryOutStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let start = to_usize(self.pos)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "buffer too large"))?;
        let mut data = self.buffer.lock()?;
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryOutStream {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let len = self.buffer.lock()?.len() as u64;
        self.pos = resolve_seek(self.pos, len, target)?;
        Ok(self.pos)
    }
}

impl OutStream for MemoryOutStream {
    fn set_size(&mut self, size: u64) -> io::Result<()> {
        let new_len = to_usize(size)?;
        self.buffer.lock()?.resize(new_len, 0);
        self.pos = self.pos.min(size);
        Ok(())
    }
}
