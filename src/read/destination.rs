//! Where extracted items go.
//!
//! The extraction driver asks a [`Destination`] for an output stream per file
//! item and tells it how the item ended, so file-backed destinations can set
//! modification times or remove partial output.

use std::fs;
use std::path::{Path, PathBuf};

use super::info::ArchiveItemInfo;
use super::options::OverwritePolicy;
use super::path_safety::{PathSafety, validate_extract_path};
use crate::stream::{FileOutStream, MemoryOutStream, OutStream, SharedBuffer};
use crate::{Error, ErrorCode, Result};

pub(crate) trait Destination: Send {
    /// Opens the output for a file item. `Ok(None)` leaves the item alone.
    fn open(&mut self, item: &ArchiveItemInfo) -> Result<Option<Box<dyn OutStream>>>;

    /// Handles a directory item.
    fn directory(&mut self, item: &ArchiveItemInfo) -> Result<()> {
        let _ = item;
        Ok(())
    }

    /// Called once the engine has reported the item's outcome.
    fn complete(&mut self, item: &ArchiveItemInfo, success: bool) -> Result<()> {
        let _ = (item, success);
        Ok(())
    }
}

/// Collects a single item into a shared buffer.
pub(crate) struct MemoryDestination {
    buffer: SharedBuffer,
}

impl MemoryDestination {
    pub fn new(buffer: SharedBuffer) -> Self {
        Self { buffer }
    }
}

impl Destination for MemoryDestination {
    fn open(&mut self, _item: &ArchiveItemInfo) -> Result<Option<Box<dyn OutStream>>> {
        Ok(Some(Box::new(MemoryOutStream::with_buffer(self.buffer.clone()))))
    }
}

/// Target of test runs, where the engine asks for no streams.
pub(crate) struct Discard;

impl Destination for Discard {
    fn open(&mut self, _item: &ArchiveItemInfo) -> Result<Option<Box<dyn OutStream>>> {
        Ok(None)
    }
}

fn set_mtime(path: &Path, item: &ArchiveItemInfo) {
    let Some(modified) = item.modified else {
        return;
    };
    let time = filetime::FileTime::from_system_time(modified.as_system_time());
    if let Err(e) = filetime::set_file_mtime(path, time) {
        log::warn!("cannot set modification time of {}: {e}", path.display());
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("cannot remove partial output {}: {e}", path.display());
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(e, parent))
        }
        _ => Ok(()),
    }
}

/// Writes a single item to a chosen file, replacing it.
pub(crate) struct FileDestination {
    path: PathBuf,
    preserve_mtime: bool,
}

impl FileDestination {
    pub fn new(path: impl Into<PathBuf>, preserve_mtime: bool) -> Self {
        Self {
            path: path.into(),
            preserve_mtime,
        }
    }
}

impl Destination for FileDestination {
    fn open(&mut self, _item: &ArchiveItemInfo) -> Result<Option<Box<dyn OutStream>>> {
        create_parent(&self.path)?;
        Ok(Some(Box::new(FileOutStream::create(&self.path)?)))
    }

    fn complete(&mut self, item: &ArchiveItemInfo, success: bool) -> Result<()> {
        if !success {
            remove_partial(&self.path);
        } else if self.preserve_mtime {
            set_mtime(&self.path, item);
        }
        Ok(())
    }
}

/// Recreates the archive tree below a root directory.
pub(crate) struct DirectoryDestination {
    root: PathBuf,
    overwrite: OverwritePolicy,
    safety: PathSafety,
    preserve_mtime: bool,
    current: Option<PathBuf>,
}

impl DirectoryDestination {
    pub fn new(
        root: impl Into<PathBuf>,
        overwrite: OverwritePolicy,
        safety: PathSafety,
        preserve_mtime: bool,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io_at(e, &root))?;
        Ok(Self {
            root,
            overwrite,
            safety,
            preserve_mtime,
            current: None,
        })
    }

    fn resolve(&self, item: &ArchiveItemInfo) -> Result<PathBuf> {
        validate_extract_path(&item.path, &self.root, self.safety, item.index)
    }
}

impl Destination for DirectoryDestination {
    fn open(&mut self, item: &ArchiveItemInfo) -> Result<Option<Box<dyn OutStream>>> {
        let path = self.resolve(item)?;
        if path.exists() {
            match self.overwrite {
                OverwritePolicy::Error => {
                    return Err(Error::new(
                        ErrorCode::FileExists,
                        format!("{} already exists", path.display()),
                    ));
                }
                OverwritePolicy::Skip => {
                    log::debug!("skipping existing {}", path.display());
                    return Ok(None);
                }
                OverwritePolicy::Overwrite => {}
            }
        }
        create_parent(&path)?;
        let stream = FileOutStream::create(&path)?;
        self.current = Some(path);
        Ok(Some(Box::new(stream)))
    }

    fn directory(&mut self, item: &ArchiveItemInfo) -> Result<()> {
        let path = self.resolve(item)?;
        fs::create_dir_all(&path).map_err(|e| Error::io_at(e, &path))
    }

    fn complete(&mut self, item: &ArchiveItemInfo, success: bool) -> Result<()> {
        let Some(path) = self.current.take() else {
            return Ok(());
        };
        if !success {
            remove_partial(&path);
        } else if self.preserve_mtime {
            set_mtime(&path, item);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::Timestamp;

    fn item(index: usize, path: &str) -> ArchiveItemInfo {
        ArchiveItemInfo {
            index,
            path: path.to_string(),
            modified: Timestamp::from_unix_secs(1_600_000_000),
            ..ArchiveItemInfo::default()
        }
    }

    #[test]
    fn directory_creates_parents_and_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest =
            DirectoryDestination::new(dir.path(), OverwritePolicy::Error, PathSafety::Strict, true)
                .unwrap();
        let item = item(0, "a/b/c.txt");
        let mut out = dest.open(&item).unwrap().unwrap();
        out.write_all(b"abc").unwrap();
        drop(out);
        dest.complete(&item, true).unwrap();

        let path = dir.path().join("a/b/c.txt");
        assert_eq!(fs::read(&path).unwrap(), b"abc");
        let mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_600_000_000);
    }

    #[test]
    fn overwrite_policies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"old").unwrap();
        let existing = item(0, "x");

        let mut strict =
            DirectoryDestination::new(dir.path(), OverwritePolicy::Error, PathSafety::Strict, false)
                .unwrap();
        let err = strict.open(&existing).err().unwrap();
        assert_eq!(err.code(), ErrorCode::FileExists);

        let mut skip =
            DirectoryDestination::new(dir.path(), OverwritePolicy::Skip, PathSafety::Strict, false)
                .unwrap();
        assert!(skip.open(&existing).unwrap().is_none());

        let mut replace = DirectoryDestination::new(
            dir.path(),
            OverwritePolicy::Overwrite,
            PathSafety::Strict,
            false,
        )
        .unwrap();
        let mut out = replace.open(&existing).unwrap().unwrap();
        out.write_all(b"new").unwrap();
        drop(out);
        replace.complete(&existing, true).unwrap();
        assert_eq!(fs::read(dir.path().join("x")).unwrap(), b"new");
    }

    #[test]
    fn failed_item_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest = DirectoryDestination::new(
            dir.path(),
            OverwritePolicy::Overwrite,
            PathSafety::Strict,
            true,
        )
        .unwrap();
        let item = item(2, "partial.bin");
        let mut out = dest.open(&item).unwrap().unwrap();
        out.write_all(b"half").unwrap();
        drop(out);
        dest.complete(&item, false).unwrap();
        assert!(!dir.path().join("partial.bin").exists());
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest =
            DirectoryDestination::new(dir.path(), OverwritePolicy::Error, PathSafety::Strict, true)
                .unwrap();
        let err = dest.open(&item(5, "../escape.txt")).err().unwrap();
        assert!(matches!(err, Error::PathTraversal { entry_index: 5, .. }));
    }
}
