//! Archive creation.
//!
//! An [`ArchiveWriter`] collects items and hands them to the engine in one
//! batch when [`ArchiveWriter::finalize`] is called. Nothing is read from
//! disk or compressed before that.
//!
//! # Example
//!
//! ```rust,no_run
//! use szbridge::{ArchiveFormat, ArchiveWriter};
//!
//! let mut writer = ArchiveWriter::create("backup.7z", ArchiveFormat::SevenZip)?
//!     .with_level(9)?;
//! writer.set_password("secret")?;
//! writer.add_directory("documents")?;
//! writer.add_buffer("notes/todo.txt", b"buy milk".to_vec())?;
//! writer.finalize()?;
//! # Ok::<(), szbridge::Error>(())
//! ```

mod entry_input;
mod item;
mod options;
mod update;

pub use item::{FileSource, ItemKind, LinkTarget, UpdateItemInfo};
pub use options::{ArchiveProperties, CompressionLevel, CompressionMethod};

use std::path::{Path, PathBuf};

use update::UpdateDriver;

use crate::engine;
use crate::format::ArchiveFormat;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::stream::{FileOutStream, MemoryOutStream, OutStream, SharedBuffer, split_into_volumes};
use crate::{Error, Password, Result};

/// Where the archive bytes go.
#[derive(Debug)]
enum Target {
    File(PathBuf),
    Memory(SharedBuffer),
}

/// State of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Accepting new items and settings.
    AcceptingEntries,
    /// `finalize` ran, successfully or not.
    Finished,
}

/// Builds one archive of a fixed format.
///
/// Items are written in the order they were added. Writing is
/// all-or-nothing: if any item fails, [`finalize`](Self::finalize) returns
/// the error and no archive file is left behind.
pub struct ArchiveWriter {
    format: ArchiveFormat,
    target: Target,
    properties: ArchiveProperties,
    items: Vec<UpdateItemInfo>,
    progress: Option<Box<dyn ProgressReporter>>,
    state: WriterState,
    volumes: Vec<PathBuf>,
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("format", &self.format)
            .field("target", &self.target)
            .field("properties", &self.properties)
            .field("items", &self.items.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ArchiveWriter {
    /// Starts an archive that will be written to `path` on finalize.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] when `format` cannot be created.
    pub fn create(path: impl AsRef<Path>, format: ArchiveFormat) -> Result<Self> {
        Self::new(Target::File(path.as_ref().to_path_buf()), format)
    }

    /// Starts an archive that is kept in memory; see
    /// [`into_buffer`](Self::into_buffer).
    pub fn create_in_memory(format: ArchiveFormat) -> Result<Self> {
        Self::new(Target::Memory(SharedBuffer::new()), format)
    }

    fn new(target: Target, format: ArchiveFormat) -> Result<Self> {
        engine::init();
        if !format.info().can_write || !engine::has_handler(format) {
            return Err(Error::not_supported(format!("creating {format} archives")));
        }
        Ok(Self {
            format,
            target,
            properties: ArchiveProperties::default(),
            items: Vec::new(),
            progress: None,
            state: WriterState::AcceptingEntries,
            volumes: Vec::new(),
        })
    }

    fn ensure_accepting_entries(&self) -> Result<()> {
        match self.state {
            WriterState::AcceptingEntries => Ok(()),
            WriterState::Finished => Err(Error::InvalidState(
                "archive already finalized".to_string(),
            )),
        }
    }

    /// Format being written.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Current settings.
    pub fn properties(&self) -> &ArchiveProperties {
        &self.properties
    }

    /// Replaces all settings at once.
    pub fn set_properties(&mut self, properties: ArchiveProperties) -> Result<()> {
        self.ensure_accepting_entries()?;
        if properties.volume_size.is_some() {
            self.check_volume_target(properties.volume_size)?;
        }
        self.properties = properties;
        Ok(())
    }

    /// Sets the compression level, 0-9.
    pub fn with_level(mut self, level: u32) -> Result<Self> {
        self.set_level(level)?;
        Ok(self)
    }

    /// In-place form of [`with_level`](Self::with_level).
    pub fn set_level(&mut self, level: u32) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.properties = self.properties.clone().level(level)?;
        Ok(())
    }

    /// Encrypts item data with `password`. An empty password disables
    /// encryption.
    pub fn set_password(&mut self, password: impl Into<Password>) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.properties.password = Some(password.into());
        Ok(())
    }

    /// Encrypts the item listing too (7z only).
    pub fn set_encrypt_headers(&mut self, encrypt: bool) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.properties.encrypt_headers = encrypt;
        Ok(())
    }

    /// Enables or disables solid compression (7z only).
    pub fn set_solid(&mut self, solid: bool) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.properties.solid = Some(solid);
        Ok(())
    }

    /// Splits the finished archive into volumes of `size` bytes named
    /// `<path>.001`, `<path>.002` and so on.
    pub fn set_volume_size(&mut self, size: u64) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.check_volume_target(Some(size))?;
        self.properties.volume_size = Some(size);
        Ok(())
    }

    fn check_volume_target(&self, size: Option<u64>) -> Result<()> {
        if size == Some(0) {
            return Err(Error::InvalidArgument("volume size must be positive".to_string()));
        }
        if matches!(self.target, Target::Memory(_)) {
            return Err(Error::not_supported("volumes for in-memory archives"));
        }
        Ok(())
    }

    /// Installs a progress reporter for [`finalize`](Self::finalize).
    /// Returning `false` from it cancels the write.
    pub fn set_progress(&mut self, reporter: impl ProgressReporter + 'static) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.progress = Some(Box::new(reporter));
        Ok(())
    }

    /// Queues the file at `path`, stored under its file name.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = entry_input::file_name(path)?;
        self.add_file_as(path, &name)
    }

    /// Queues the file at `path`, stored as `archive_path`.
    pub fn add_file_as(&mut self, path: impl AsRef<Path>, archive_path: &str) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.items.push(UpdateItemInfo::from_file(path, archive_path)?);
        Ok(())
    }

    /// Queues the directory at `path` and everything below it, stored under
    /// the directory's name.
    pub fn add_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = entry_input::file_name(path)?;
        self.add_directory_as(path, &name)
    }

    /// Queues the directory at `path` and everything below it, stored under
    /// `archive_path`.
    pub fn add_directory_as(&mut self, path: impl AsRef<Path>, archive_path: &str) -> Result<()> {
        self.queue_directory(path.as_ref(), archive_path, true)
    }

    /// Queues the directory at `path` and its direct children only.
    pub(crate) fn add_directory_shallow(&mut self, path: &Path) -> Result<()> {
        let name = entry_input::file_name(path)?;
        self.queue_directory(path, &name, false)
    }

    fn queue_directory(&mut self, path: &Path, archive_path: &str, recursive: bool) -> Result<()> {
        self.ensure_accepting_entries()?;
        let items = entry_input::walk_directory(path, archive_path, recursive)?;
        log::debug!("queued {} items from {}", items.len(), path.display());
        self.items.extend(items);
        Ok(())
    }

    /// Queues an in-memory file.
    pub fn add_buffer(
        &mut self,
        archive_path: &str,
        data: impl Into<std::sync::Arc<[u8]>>,
    ) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.items.push(UpdateItemInfo::from_buffer(archive_path, data)?);
        Ok(())
    }

    /// Queues a directory entry with no content.
    pub fn add_empty_directory(&mut self, archive_path: &str) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.items.push(UpdateItemInfo::directory(archive_path)?);
        Ok(())
    }

    /// Queues a symbolic link stored as `archive_path` pointing at `target`.
    ///
    /// Single-stream formats cannot hold links.
    pub fn add_symlink(&mut self, archive_path: &str, target: &str) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.items.push(UpdateItemInfo::symlink(archive_path, target)?);
        Ok(())
    }

    /// Queues a hard link to the archive item `target`. Only tar stores hard
    /// links; other formats fail at finalize.
    pub fn add_hard_link(&mut self, archive_path: &str, target: &str) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.items.push(UpdateItemInfo::hard_link(archive_path, target)?);
        Ok(())
    }

    /// Queues a fully described item.
    pub fn add_item(&mut self, item: UpdateItemInfo) -> Result<()> {
        self.ensure_accepting_entries()?;
        item.validate()?;
        self.items.push(item);
        Ok(())
    }

    /// Number of queued items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns true once [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.state == WriterState::Finished
    }

    /// Volume files produced by the last finalize; empty when the archive
    /// was not split.
    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// Writes the archive.
    ///
    /// One-shot: later calls fail with [`Error::InvalidState`], whether or
    /// not the first one succeeded.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] when the progress reporter stopped the write;
    /// otherwise the first item failure, with the queued item count and
    /// first item path in the message.
    pub fn finalize(&mut self) -> Result<()> {
        self.ensure_accepting_entries()?;
        self.state = WriterState::Finished;

        let mut progress = self.progress.take();
        let result = self.write(progress.as_deref_mut());
        self.progress = progress;

        if let Err(error) = result {
            self.discard_output();
            return Err(error);
        }
        if let (Target::File(path), Some(size)) = (&self.target, self.properties.volume_size) {
            self.volumes = split_into_volumes(path, size)?;
        }
        log::debug!(
            "wrote {} archive with {} items{}",
            self.format,
            self.items.len(),
            match self.volumes.len() {
                0 => String::new(),
                n => format!(" in {n} volumes"),
            }
        );
        Ok(())
    }

    fn write(&self, reporter: Option<&mut (dyn ProgressReporter + 'static)>) -> Result<()> {
        let mut archive = engine::create_out_archive(self.format)?;
        let properties = self.properties.engine_properties(self.format);
        archive
            .set_properties(&properties)
            .map_err(|failure| failure.into_error(&format!("configuring {} writer", self.format)))?;

        let out: Box<dyn OutStream> = match &self.target {
            Target::File(path) => Box::new(FileOutStream::create(path)?),
            Target::Memory(buffer) => Box::new(MemoryOutStream::with_buffer(buffer.clone())),
        };
        let password = self.properties.password.clone();
        let mut driver = UpdateDriver::new(&self.items, ProgressTracker::new(reporter), password);
        let outcome = archive.update_items(out, self.items.len(), &mut driver);
        match outcome {
            Ok(()) => Ok(()),
            Err(_) if driver.is_cancelled() => Err(Error::Cancelled),
            Err(failure) => {
                let first = self
                    .items
                    .first()
                    .map_or_else(|| "<none>".to_string(), |item| item.path.to_string());
                Err(failure.into_error(&format!(
                    "writing {} items (first '{first}', {} done)",
                    self.items.len(),
                    driver.written()
                )))
            }
        }
    }

    fn discard_output(&self) {
        match &self.target {
            Target::File(path) => {
                if let Err(e) = std::fs::remove_file(path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("cannot remove incomplete archive {}: {e}", path.display());
                    }
                }
            }
            Target::Memory(buffer) => drop(buffer.take()),
        }
    }

    /// Returns true when the archive is kept in memory.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.target, Target::Memory(_))
    }

    /// Bytes of a finalized in-memory archive.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before finalize or for file targets.
    pub fn into_buffer(mut self) -> Result<Vec<u8>> {
        self.take_buffer()
    }

    /// Moves the bytes of a finalized in-memory archive out of the writer.
    /// A second call returns an empty buffer.
    pub fn take_buffer(&mut self) -> Result<Vec<u8>> {
        match (&self.target, self.state) {
            (Target::Memory(buffer), WriterState::Finished) => Ok(buffer.take()),
            (Target::Memory(_), _) => Err(Error::InvalidState(
                "archive not finalized".to_string(),
            )),
            (Target::File(path), _) => Err(Error::InvalidState(format!(
                "archive is written to {}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::progress::{AtomicProgress, progress_fn};
    use crate::{ArchiveReader, ErrorCode};

    #[test]
    fn state_machine() {
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
        writer.add_buffer("a.txt", b"a".to_vec()).unwrap();
        assert_eq!(writer.item_count(), 1);
        assert!(!writer.is_finalized());
        writer.finalize().unwrap();
        assert!(writer.is_finalized());

        let err = writer.finalize().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert!(writer.add_buffer("b.txt", b"b".to_vec()).is_err());
        assert!(writer.add_empty_directory("d").is_err());
        assert!(writer.set_password("x").is_err());
        assert_eq!(writer.item_count(), 1);

        let data = writer.into_buffer().unwrap();
        assert_eq!(ArchiveReader::open_buffer(data).unwrap().item_count(), 1);
    }

    #[test]
    fn buffer_needs_finalize() {
        let writer = ArchiveWriter::create_in_memory(ArchiveFormat::Zip).unwrap();
        assert_eq!(writer.into_buffer().unwrap_err().code(), ErrorCode::InvalidState);
    }

    #[test]
    fn unwritable_formats_are_refused() {
        let err = ArchiveWriter::create_in_memory(ArchiveFormat::Rar).unwrap_err();
        assert!(err.is_not_supported());
        assert!(ArchiveWriter::create_in_memory(ArchiveFormat::Unknown).is_err());
    }

    #[test]
    fn level_is_checked() {
        let writer = ArchiveWriter::create_in_memory(ArchiveFormat::Zip).unwrap();
        let mut writer = writer.with_level(3).unwrap();
        writer.set_solid(false).unwrap();
        assert!(writer.set_level(12).is_err());
        assert_eq!(writer.properties().level, Some(3));
        assert_eq!(writer.properties().solid, Some(false));
        assert!(writer.with_level(12).is_err());
    }

    #[test]
    fn volumes_need_a_file_target() {
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
        assert!(writer.set_volume_size(1024).unwrap_err().is_not_supported());

        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            ArchiveWriter::create(dir.path().join("a.7z"), ArchiveFormat::SevenZip).unwrap();
        assert_eq!(
            writer.set_volume_size(0).unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn split_archive_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.7z");
        let mut writer = ArchiveWriter::create(&path, ArchiveFormat::SevenZip).unwrap();
        writer.set_solid(false).unwrap();
        let mut state = 0x2545_f491_u32;
        let payload: Vec<u8> = (0..20_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        writer.add_buffer("data.bin", payload.clone()).unwrap();
        writer.set_volume_size(1024).unwrap();
        writer.finalize().unwrap();
        assert!(writer.volumes().len() > 1);
        assert!(!path.exists());

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.extract_to_memory(0).unwrap(), payload);
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("vanishing.txt");
        std::fs::write(&source, b"soon gone").unwrap();
        let path = dir.path().join("out.zip");
        let mut writer = ArchiveWriter::create(&path, ArchiveFormat::Zip).unwrap();
        writer.add_file(&source).unwrap();
        std::fs::remove_file(&source).unwrap();

        let err = writer.finalize().unwrap_err();
        assert!(err.to_string().contains("vanishing.txt"), "{err}");
        assert!(!path.exists());
    }

    #[test]
    fn progress_can_cancel() {
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::Zip).unwrap();
        writer.add_buffer("a.bin", vec![0u8; 64 * 1024]).unwrap();
        writer.add_buffer("b.bin", vec![1u8; 64 * 1024]).unwrap();
        writer.set_progress(progress_fn(|_, _| false)).unwrap();
        assert!(writer.finalize().unwrap_err().is_cancelled());
        assert!(writer.into_buffer().unwrap().is_empty());
    }

    #[test]
    fn progress_reaches_total() {
        let progress = AtomicProgress::shared();
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::Tar).unwrap();
        writer.add_buffer("a.bin", vec![7u8; 4096]).unwrap();
        writer.set_progress(Arc::clone(&progress)).unwrap();
        writer.finalize().unwrap();
        assert_eq!(progress.items_completed(), 1);
        assert!(progress.completed_bytes() >= 4096);
    }

    #[test]
    fn add_item_validates() {
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::Tar).unwrap();
        let mut item = UpdateItemInfo::directory("d").unwrap();
        item.is_dir = false;
        assert!(writer.add_item(item).is_err());
        assert_eq!(writer.item_count(), 0);
    }
}
