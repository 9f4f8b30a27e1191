//! Split volume sets (`name.001`, `name.002`, ...).

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{InStream, StreamProps, resolve_seek};
use crate::{Error, ErrorCode, Result};

/// Returns the path of volume `number` (1-based) for `base`.
pub fn volume_path(base: &Path, number: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{number:03}"));
    PathBuf::from(name)
}

/// Splits a `.NNN` suffix off `path`, returning the base path and number.
pub(crate) fn split_volume_suffix(path: &Path) -> Option<(PathBuf, u32)> {
    let text = path.to_str()?;
    let (base, digits) = text.rsplit_once('.')?;
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) || base.is_empty() {
        return None;
    }
    Some((PathBuf::from(base), digits.parse().ok()?))
}

/// Concatenation of all volumes of a split archive, presented as one stream.
#[derive(Debug)]
pub struct VolumeInStream {
    paths: Vec<PathBuf>,
    sizes: Vec<u64>,
    files: Vec<Option<BufReader<File>>>,
    total: u64,
    pos: u64,
}

impl VolumeInStream {
    /// Opens the set containing `path`.
    ///
    /// `path` may be the first volume (`archive.7z.001`) or the base path
    /// (`archive.7z`) when `archive.7z.001` exists. Volumes are discovered
    /// until the first missing number.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base = match split_volume_suffix(path) {
            Some((base, 1)) => base,
            Some((_, n)) => {
                return Err(Error::InvalidArgument(format!(
                    "{} is volume {n}; open the first volume",
                    path.display()
                )));
            }
            None => path.to_path_buf(),
        };

        let mut paths = Vec::new();
        let mut sizes = Vec::new();
        for number in 1.. {
            let candidate = volume_path(&base, number);
            match std::fs::metadata(&candidate) {
                Ok(meta) => {
                    sizes.push(meta.len());
                    paths.push(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(Error::io_at(e, &candidate)),
            }
        }
        if paths.is_empty() {
            return Err(Error::new(
                ErrorCode::FileNotFound,
                format!("no volumes found for {}", base.display()),
            ));
        }
        log::debug!("opened {} volumes of {}", paths.len(), base.display());

        let total = sizes.iter().sum();
        let files = paths.iter().map(|_| None).collect();
        Ok(Self {
            paths,
            sizes,
            files,
            total,
            pos: 0,
        })
    }

    /// Number of volumes in the set.
    pub fn volume_count(&self) -> usize {
        self.paths.len()
    }

    /// Paths of all volumes, in order.
    pub fn volume_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    // Volume index and offset within it for a logical position below `total`.
    fn locate(&self, pos: u64) -> (usize, u64) {
        let mut remaining = pos;
        for (i, &size) in self.sizes.iter().enumerate() {
            if remaining < size {
                return (i, remaining);
            }
            remaining -= size;
        }
        (self.sizes.len(), 0)
    }

    fn volume(&mut self, index: usize) -> io::Result<&mut BufReader<File>> {
        let slot = &mut self.files[index];
        if slot.is_none() {
            *slot = Some(BufReader::new(File::open(&self.paths[index])?));
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::other("volume handle unavailable"))
    }
}

impl Read for VolumeInStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.total {
            return Ok(0);
        }
        let (index, offset) = self.locate(self.pos);
        let available = self.sizes[index] - offset;
        let want = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
        let volume = self.volume(index)?;
        volume.seek(SeekFrom::Start(offset))?;
        let n = volume.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("volume {} is shorter than expected", index + 1),
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for VolumeInStream {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(self.pos, self.total, target)?;
        Ok(self.pos)
    }
}

impl InStream for VolumeInStream {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.total)
    }

    fn props(&mut self) -> io::Result<StreamProps> {
        let mut props = match self.paths.first() {
            Some(first) => super::file::metadata_props(&std::fs::metadata(first)?),
            None => StreamProps::default(),
        };
        props.size = self.total;
        Ok(props)
    }
}

/// Splits the file at `path` into `path.001`, `path.002`, ... of at most
/// `volume_size` bytes each and removes the original.
///
/// Returns the volume paths in order. An empty file yields one empty volume.
pub fn split_into_volumes(path: &Path, volume_size: u64) -> Result<Vec<PathBuf>> {
    if volume_size == 0 {
        return Err(Error::InvalidArgument("volume size must be positive".into()));
    }
    let mut source = BufReader::new(File::open(path).map_err(|e| Error::io_at(e, path))?);
    let total = source
        .get_ref()
        .metadata()
        .map_err(|e| Error::io_at(e, path))?
        .len();

    let mut written = Vec::new();
    let mut remaining = total;
    let mut number = 1u32;
    loop {
        let target = volume_path(path, number);
        let chunk = remaining.min(volume_size);
        let mut out = BufWriter::new(File::create(&target).map_err(|e| Error::io_at(e, &target))?);
        let copied = io::copy(&mut (&mut source).take(chunk), &mut out)
            .map_err(|e| Error::io_at(e, &target))?;
        out.flush().map_err(|e| Error::io_at(e, &target))?;
        written.push(target);
        if copied != chunk {
            return Err(Error::new(
                ErrorCode::StreamReadError,
                format!("{} changed while splitting", path.display()),
            ));
        }
        remaining -= chunk;
        if remaining == 0 {
            break;
        }
        number += 1;
    }
    drop(source);
    std::fs::remove_file(path).map_err(|e| Error::io_at(e, path))?;
    log::debug!("split {} into {} volumes", path.display(), written.len());
    Ok(written)
}
