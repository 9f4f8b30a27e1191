//! Archive reading: listing, extraction and integrity tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use szbridge::ArchiveReader;
//!
//! let mut reader = ArchiveReader::open("photos.zip")?;
//! for item in reader.items()? {
//!     println!("{}: {} bytes", item.path, item.size);
//! }
//! let summary = reader.extract_all("photos")?;
//! assert!(summary.is_ok());
//! # Ok::<(), szbridge::Error>(())
//! ```

mod destination;
mod extract;
mod info;
mod options;
mod path_safety;

pub use info::{ArchiveInfo, ArchiveItemInfo, ExtractSummary, ItemFailure};
pub use options::{ExtractOptions, OverwritePolicy};
pub use path_safety::{PathSafety, validate_extract_path};

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use destination::{
    Destination, DirectoryDestination, Discard, FileDestination, MemoryDestination,
};
use extract::ExtractDriver;

use crate::engine::{self, EngineResult, InArchive, OpenCallback};
use crate::format::detect::HEADER_PROBE_SIZE;
use crate::format::{ArchiveFormat, detect_format_from_bytes, guess_format_from_extension};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::property::PropId;
use crate::stream::{FileInStream, InStream, MemoryInStream, SharedBuffer, VolumeInStream};
use crate::{Error, Password, Result};

struct Source {
    stream: Box<dyn InStream>,
    name: Option<String>,
    volumes: u32,
}

impl Source {
    fn file(path: &Path) -> Result<Self> {
        let split = crate::stream::split_volume_suffix(path);
        let is_volume_set = split.is_some() || (!path.exists() && volume_first(path).exists());
        if is_volume_set {
            let stream = VolumeInStream::open(path)?;
            let base = split.map_or_else(|| path.to_path_buf(), |(base, _)| base);
            return Ok(Self {
                volumes: u32::try_from(stream.volume_count()).unwrap_or(u32::MAX),
                stream: Box::new(stream),
                name: file_name(&base),
            });
        }
        Ok(Self {
            stream: Box::new(FileInStream::open(path)?),
            name: file_name(path),
            volumes: 1,
        })
    }

    fn buffer<B: AsRef<[u8]> + Send + 'static>(data: B) -> Self {
        Self {
            stream: Box::new(MemoryInStream::new(data)),
            name: None,
            volumes: 1,
        }
    }
}

fn volume_first(path: &Path) -> std::path::PathBuf {
    crate::stream::volume_path(path, 1)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

struct OpenContext {
    password: Option<Password>,
    name: Option<String>,
}

impl OpenCallback for OpenContext {
    fn password(&mut self) -> EngineResult<Option<Password>> {
        Ok(self.password.clone())
    }

    fn archive_name(&mut self) -> Option<String> {
        self.name.clone()
    }
}

/// Detects the format from the leading bytes, falling back to the name.
fn probe(stream: &mut Box<dyn InStream>, name: Option<&str>) -> Result<ArchiveFormat> {
    let mut header = Vec::with_capacity(HEADER_PROBE_SIZE);
    stream
        .by_ref()
        .take(HEADER_PROBE_SIZE as u64)
        .read_to_end(&mut header)?;
    stream.seek(SeekFrom::Start(0))?;

    let format = match detect_format_from_bytes(&header) {
        ArchiveFormat::Unknown => name.map_or(ArchiveFormat::Unknown, guess_format_from_extension),
        format => format,
    };
    if format == ArchiveFormat::Unknown {
        return Err(Error::unsupported_format(match name {
            Some(name) => format!("{name}: unrecognized archive format"),
            None => "unrecognized archive format".to_string(),
        }));
    }
    Ok(format)
}

/// An opened archive.
///
/// A reader owns its input stream and is meant for one thread at a time.
/// Per-item queries are answered from the engine on each call.
pub struct ArchiveReader {
    archive: Box<dyn InArchive>,
    format: ArchiveFormat,
    volumes: u32,
    password: Option<Password>,
    progress: Option<Box<dyn ProgressReporter>>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("format", &self.format)
            .field("item_count", &self.archive.item_count())
            .field("volumes", &self.volumes)
            .finish_non_exhaustive()
    }
}

impl ArchiveReader {
    /// Opens the archive at `path`, detecting its format.
    ///
    /// A path ending in `.001`, or a base path whose `.001` volume exists,
    /// opens the whole volume set.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_format(path, ArchiveFormat::Unknown)
    }

    /// Opens the archive at `path` as `format`; [`ArchiveFormat::Unknown`]
    /// detects it.
    pub fn open_with_format(path: impl AsRef<Path>, format: ArchiveFormat) -> Result<Self> {
        Self::from_source(Source::file(path.as_ref())?, format, None)
    }

    /// Opens an archive whose headers are encrypted.
    pub fn open_with_password(
        path: impl AsRef<Path>,
        password: impl Into<Password>,
    ) -> Result<Self> {
        Self::from_source(
            Source::file(path.as_ref())?,
            ArchiveFormat::Unknown,
            Some(password.into()),
        )
    }

    /// Opens an archive held in memory, detecting its format.
    pub fn open_buffer<B: AsRef<[u8]> + Send + 'static>(data: B) -> Result<Self> {
        Self::open_buffer_with_format(data, ArchiveFormat::Unknown)
    }

    /// Opens an archive held in memory as `format`.
    pub fn open_buffer_with_format<B: AsRef<[u8]> + Send + 'static>(
        data: B,
        format: ArchiveFormat,
    ) -> Result<Self> {
        Self::from_source(Source::buffer(data), format, None)
    }

    /// Opens an in-memory archive whose headers are encrypted.
    pub fn open_buffer_with_password<B: AsRef<[u8]> + Send + 'static>(
        data: B,
        password: impl Into<Password>,
    ) -> Result<Self> {
        Self::from_source(
            Source::buffer(data),
            ArchiveFormat::Unknown,
            Some(password.into()),
        )
    }

    fn from_source(
        source: Source,
        format: ArchiveFormat,
        password: Option<Password>,
    ) -> Result<Self> {
        engine::init();
        let Source {
            mut stream,
            name,
            volumes,
        } = source;
        let format = match format {
            ArchiveFormat::Unknown => probe(&mut stream, name.as_deref())?,
            format => format,
        };

        let mut archive = engine::create_in_archive(format)?;
        let mut callback = OpenContext {
            password: password.clone(),
            name: name.clone(),
        };
        archive.open(stream, &mut callback).map_err(|failure| {
            let context = match &name {
                Some(name) => format!("cannot open {name} as {format}"),
                None => format!("cannot open buffer as {format}"),
            };
            failure.into_error(&context)
        })?;
        log::debug!(
            "opened {format} archive{}: {} items in {volumes} volume(s)",
            name.as_deref().map(|n| format!(" {n}")).unwrap_or_default(),
            archive.item_count()
        );
        Ok(Self {
            archive,
            format,
            volumes,
            password,
            progress: None,
        })
    }

    /// Sets the password used for encrypted items.
    pub fn with_password(mut self, password: impl Into<Password>) -> Self {
        self.set_password(password);
        self
    }

    /// Sets the password used for encrypted items.
    pub fn set_password(&mut self, password: impl Into<Password>) {
        self.password = Some(password.into());
    }

    /// Forgets the password.
    pub fn clear_password(&mut self) {
        self.password = None;
    }

    /// Installs a progress reporter for later extractions and tests.
    pub fn set_progress(&mut self, reporter: impl ProgressReporter + 'static) {
        self.progress = Some(Box::new(reporter));
    }

    /// Format the archive was opened as.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Number of items.
    pub fn item_count(&self) -> usize {
        self.archive.item_count()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.item_count();
        if index < count {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "item index {index} out of range ({count} items)"
            )))
        }
    }

    /// Metadata of the item at `index`.
    pub fn item_info(&self, index: usize) -> Result<ArchiveItemInfo> {
        self.check_index(index)?;
        ArchiveItemInfo::query(self.archive.as_ref(), index)
    }

    /// Metadata of every item, in archive order.
    pub fn items(&self) -> Result<Vec<ArchiveItemInfo>> {
        (0..self.item_count())
            .map(|index| ArchiveItemInfo::query(self.archive.as_ref(), index))
            .collect()
    }

    /// Finds the first item whose path equals `path`. Backslashes and
    /// leading or trailing slashes are ignored.
    pub fn find(&self, path: &str) -> Result<Option<ArchiveItemInfo>> {
        let wanted = path.replace('\\', "/");
        let wanted = wanted.trim_matches('/');
        for index in 0..self.item_count() {
            let item = ArchiveItemInfo::query(self.archive.as_ref(), index)?;
            if item.path == wanted {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Returns true if an item with `path` exists.
    pub fn contains(&self, path: &str) -> bool {
        matches!(self.find(path), Ok(Some(_)))
    }

    /// Archive-level summary.
    pub fn info(&self) -> Result<ArchiveInfo> {
        let prop = |id| {
            self.archive
                .archive_property(id)
                .map_err(|f| f.into_error("archive info"))
        };
        let items = self.items()?;
        let reported_volumes = prop(PropId::NumVolumes)?.as_u32().unwrap_or(1);
        Ok(ArchiveInfo {
            format: self.format,
            item_count: items.len(),
            physical_size: prop(PropId::PhySize)?.as_u64().unwrap_or(0),
            total_size: items.iter().map(|item| item.size).sum(),
            is_solid: prop(PropId::Solid)?.as_bool().unwrap_or(false),
            is_multi_volume: self.volumes > 1 || reported_volumes > 1,
            volume_count: self.volumes.max(reported_volumes),
            has_encrypted_header: prop(PropId::HeadersEncrypted)?
                .as_bool()
                .unwrap_or(false),
            has_encrypted_items: items.iter().any(|item| item.encrypted),
            method: prop(PropId::Method)?.as_str().map(str::to_string),
            comment: prop(PropId::Comment)?.as_str().map(str::to_string),
        })
    }

    /// Extracts one item into memory.
    ///
    /// # Errors
    ///
    /// Fails fast with the item's error, e.g. [`Error::WrongPassword`] or a
    /// CRC [`Error::Data`].
    pub fn extract_to_memory(&mut self, index: usize) -> Result<Vec<u8>> {
        let item = self.item_info(index)?;
        if item.is_dir {
            return Err(Error::InvalidArgument(format!("'{}' is a directory", item.path)));
        }
        let buffer = SharedBuffer::new();
        let mut destination = MemoryDestination::new(buffer.clone());
        self.run(&[index], false, &mut destination, None)?
            .into_result()?;
        Ok(buffer.take())
    }

    /// Extracts one item to `path`, replacing an existing file. A failed
    /// extraction removes the partial file.
    pub fn extract_to_file(&mut self, index: usize, path: impl AsRef<Path>) -> Result<()> {
        let item = self.item_info(index)?;
        if item.is_dir {
            return Err(Error::InvalidArgument(format!("'{}' is a directory", item.path)));
        }
        let mut destination = FileDestination::new(path.as_ref(), true);
        self.run(&[index], false, &mut destination, None)?
            .into_result()
            .map(drop)
    }

    /// Extracts the items at `indices` below `dest`, keeping their archive
    /// paths. Existing files are replaced.
    ///
    /// Best-effort: failing items are listed in the summary.
    pub fn extract_items(
        &mut self,
        indices: &[usize],
        dest: impl AsRef<Path>,
    ) -> Result<ExtractSummary> {
        for &index in indices {
            self.check_index(index)?;
        }
        let options = ExtractOptions::new().overwrite(OverwritePolicy::Overwrite);
        let mut destination = Self::directory(dest.as_ref(), &options)?;
        self.run(indices, false, &mut destination, None)
    }

    /// Extracts every item below `dest`, replacing existing files.
    ///
    /// Best-effort: failing items are listed in the summary.
    pub fn extract_all(&mut self, dest: impl AsRef<Path>) -> Result<ExtractSummary> {
        self.extract_all_with(
            dest,
            ExtractOptions::new().overwrite(OverwritePolicy::Overwrite),
        )
    }

    /// Extracts every item below `dest` with explicit options.
    pub fn extract_all_with(
        &mut self,
        dest: impl AsRef<Path>,
        mut options: ExtractOptions,
    ) -> Result<ExtractSummary> {
        let mut destination = Self::directory(dest.as_ref(), &options)?;
        let all: Vec<usize> = (0..self.item_count()).collect();
        let password = options.password.take();
        match options.progress.as_deref_mut() {
            Some(reporter) => {
                self.run_with(&all, false, &mut destination, password, Some(reporter))
            }
            None => self.run(&all, false, &mut destination, password),
        }
    }

    /// Decodes every item without writing anything and reports the outcome
    /// per item.
    pub fn test(&mut self) -> Result<ExtractSummary> {
        let all: Vec<usize> = (0..self.item_count()).collect();
        self.run(&all, true, &mut Discard, None)
    }

    fn directory(dest: &Path, options: &ExtractOptions) -> Result<DirectoryDestination> {
        DirectoryDestination::new(
            dest,
            options.overwrite,
            options.path_safety,
            options.preserve_mtime,
        )
    }

    fn run(
        &mut self,
        indices: &[usize],
        test: bool,
        destination: &mut dyn Destination,
        password: Option<Password>,
    ) -> Result<ExtractSummary> {
        let mut progress = self.progress.take();
        let result =
            self.run_with(indices, test, destination, password, progress.as_deref_mut());
        self.progress = progress;
        result
    }

    fn run_with(
        &mut self,
        indices: &[usize],
        test: bool,
        destination: &mut dyn Destination,
        password: Option<Password>,
        reporter: Option<&mut (dyn ProgressReporter + 'static)>,
    ) -> Result<ExtractSummary> {
        let items = indices
            .iter()
            .map(|&index| ArchiveItemInfo::query(self.archive.as_ref(), index))
            .collect::<Result<Vec<_>>>()?;
        let password = password.or_else(|| self.password.clone());
        let operation = if test { "test" } else { "extract" };
        log::debug!("{operation} {} of {} items", items.len(), self.item_count());

        let tracker = ProgressTracker::new(reporter);
        let mut driver = ExtractDriver::new(items, destination, tracker, password);
        let outcome = self.archive.extract(Some(indices), test, &mut driver);
        let cancelled = driver.is_cancelled();
        let summary = driver.into_summary();
        match outcome {
            Ok(()) => {
                log::debug!(
                    "{operation} finished: {} ok, {} failed, {} skipped",
                    summary.items_extracted,
                    summary.items_failed,
                    summary.items_skipped
                );
                Ok(summary)
            }
            Err(_) if cancelled => Err(Error::Cancelled),
            Err(failure) => Err(failure.into_error(operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use crate::stream::split_into_volumes;
    use crate::write::ArchiveWriter;

    fn sample(format: ArchiveFormat) -> Vec<u8> {
        let mut writer = ArchiveWriter::create_in_memory(format).unwrap();
        writer.add_empty_directory("docs").unwrap();
        writer.add_buffer("docs/readme.txt", b"read me".to_vec()).unwrap();
        writer.add_buffer("top.bin", vec![1u8; 300]).unwrap();
        writer.finalize().unwrap();
        writer.into_buffer().unwrap()
    }

    #[test]
    fn queries_are_stable() {
        let reader = ArchiveReader::open_buffer(sample(ArchiveFormat::SevenZip)).unwrap();
        assert_eq!(reader.format(), ArchiveFormat::SevenZip);
        assert_eq!(reader.item_count(), 3);
        for index in 0..3 {
            assert_eq!(reader.item_info(index).unwrap(), reader.item_info(index).unwrap());
        }
        assert!(reader.contains("docs/readme.txt"));
        assert!(reader.contains("\\docs\\readme.txt"));
        assert!(!reader.contains("missing"));
        let err = reader.item_info(3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn extract_single_items() {
        let mut reader = ArchiveReader::open_buffer(sample(ArchiveFormat::Zip)).unwrap();
        let item = reader.find("docs/readme.txt").unwrap().unwrap();
        assert_eq!(reader.extract_to_memory(item.index).unwrap(), b"read me");

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("copy.bin");
        let top = reader.find("top.bin").unwrap().unwrap();
        reader.extract_to_file(top.index, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), vec![1u8; 300]);

        let docs = reader.find("docs").unwrap().unwrap();
        assert!(reader.extract_to_memory(docs.index).is_err());
    }

    #[test]
    fn extract_all_rebuilds_tree() {
        let mut reader = ArchiveReader::open_buffer(sample(ArchiveFormat::Tar)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let summary = reader.extract_all(dir.path()).unwrap();
        assert!(summary.is_ok());
        assert_eq!(summary.items_extracted, 3);
        assert_eq!(summary.bytes_extracted, 307);
        assert!(dir.path().join("docs").is_dir());
        assert_eq!(std::fs::read(dir.path().join("docs/readme.txt")).unwrap(), b"read me");

        // Running again replaces the files.
        assert!(reader.extract_all(dir.path()).unwrap().is_ok());
    }

    #[test]
    fn extract_all_with_skip_policy() {
        let mut reader = ArchiveReader::open_buffer(sample(ArchiveFormat::SevenZip)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.bin"), b"keep").unwrap();
        let summary = reader
            .extract_all_with(dir.path(), ExtractOptions::new().overwrite(OverwritePolicy::Skip))
            .unwrap();
        assert_eq!(summary.items_skipped, 1);
        assert_eq!(std::fs::read(dir.path().join("top.bin")).unwrap(), b"keep");
    }

    #[test]
    fn info_reports_totals() {
        let reader = ArchiveReader::open_buffer(sample(ArchiveFormat::SevenZip)).unwrap();
        let info = reader.info().unwrap();
        assert_eq!(info.item_count, 3);
        assert_eq!(info.total_size, 307);
        assert!(info.physical_size > 0);
        assert!(!info.has_encrypted_items);
        assert!(!info.is_multi_volume);
    }

    #[test]
    fn garbage_is_not_an_archive() {
        let err = ArchiveReader::open_buffer(vec![0x42u8; 64]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    }

    #[test]
    fn explicit_format_overrides_detection() {
        let err =
            ArchiveReader::open_buffer_with_format(sample(ArchiveFormat::Zip), ArchiveFormat::SevenZip)
                .unwrap_err();
        assert!(err.is_format(), "{err}");
    }

    #[test]
    fn volume_sets_open_from_first_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.7z");
        std::fs::write(&path, sample(ArchiveFormat::SevenZip)).unwrap();
        let volumes = split_into_volumes(&path, 100).unwrap();
        assert!(volumes.len() > 1);

        let reader = ArchiveReader::open(&volumes[0]).unwrap();
        let info = reader.info().unwrap();
        assert!(info.is_multi_volume);
        assert_eq!(info.volume_count as usize, volumes.len());
        assert_eq!(reader.item_count(), 3);
    }

    #[test]
    fn test_run_verifies_everything() {
        let mut reader = ArchiveReader::open_buffer(sample(ArchiveFormat::Zip)).unwrap();
        let summary = reader.test().unwrap();
        assert!(summary.is_ok());
        assert_eq!(summary.items_extracted, 3);
    }
}
