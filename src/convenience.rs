//! One-call helpers for common tasks.
//!
//! Each function opens or creates one archive, does one thing and closes it
//! again. Use [`ArchiveReader`] and [`ArchiveWriter`] for anything finer
//! grained.
//!
//! ```rust,no_run
//! use szbridge::convenience;
//! use szbridge::{ArchiveFormat, CompressionLevel};
//!
//! convenience::compress_with(
//!     "photos",
//!     "photos.7z",
//!     ArchiveFormat::SevenZip,
//!     CompressionLevel::Ultra,
//!     Some("pw"),
//! )?;
//! for item in convenience::list_with_password("photos.7z", "pw")? {
//!     println!("{}", item.path);
//! }
//! convenience::extract_with_password("photos.7z", "restored", "pw")?;
//! # Ok::<(), szbridge::Error>(())
//! ```

use std::path::Path;

use crate::read::{ArchiveInfo, ArchiveItemInfo, ExtractSummary};
use crate::write::CompressionLevel;
use crate::{ArchiveFormat, ArchiveReader, ArchiveWriter, Error, ErrorCode, Result};

/// Name of the single item written by [`compress_data`].
pub const DATA_ITEM_NAME: &str = "data";

/// Extracts every item of `archive` below `dest`.
///
/// # Errors
///
/// Fails with the first item error if any item could not be extracted.
pub fn extract(archive: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<ExtractSummary> {
    ArchiveReader::open(archive)?.extract_all(dest)?.into_result()
}

/// Extracts every item of an encrypted `archive` below `dest`.
pub fn extract_with_password(
    archive: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    password: &str,
) -> Result<ExtractSummary> {
    ArchiveReader::open_with_password(archive, password)?
        .extract_all(dest)?
        .into_result()
}

/// Packs the file or directory at `source` into a 7z archive at `archive`.
pub fn compress(source: impl AsRef<Path>, archive: impl AsRef<Path>) -> Result<()> {
    compress_with(
        source,
        archive,
        ArchiveFormat::SevenZip,
        CompressionLevel::Normal,
        None,
    )
}

/// Packs the file or directory at `source` into `archive` with explicit
/// settings. Directories are added recursively under their own name.
pub fn compress_with(
    source: impl AsRef<Path>,
    archive: impl AsRef<Path>,
    format: ArchiveFormat,
    level: CompressionLevel,
    password: Option<&str>,
) -> Result<()> {
    let source = source.as_ref();
    let metadata = std::fs::metadata(source).map_err(|e| Error::io_at(e, source))?;

    let mut writer = ArchiveWriter::create(archive, format)?.with_level(level.value())?;
    if let Some(password) = password {
        writer.set_password(password)?;
    }
    if metadata.is_dir() {
        writer.add_directory(source)?;
    } else if metadata.is_file() {
        writer.add_file(source)?;
    } else {
        return Err(Error::InvalidArgument(format!(
            "{} is neither a file nor a directory",
            source.display()
        )));
    }
    writer.finalize()
}

/// Packs `data` as a single item named [`DATA_ITEM_NAME`] into an in-memory
/// archive.
pub fn compress_data(
    data: &[u8],
    format: ArchiveFormat,
    level: CompressionLevel,
) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::create_in_memory(format)?.with_level(level.value())?;
    writer.add_buffer(DATA_ITEM_NAME, data)?;
    writer.finalize()?;
    writer.into_buffer()
}

/// Content of the only item in `archive`.
///
/// # Errors
///
/// [`Error::InvalidArgument`] when the archive is empty or holds more than
/// one item.
pub fn extract_single_file(archive: impl AsRef<Path>) -> Result<Vec<u8>> {
    let mut reader = ArchiveReader::open(archive)?;
    match reader.item_count() {
        0 => Err(Error::InvalidArgument("archive is empty".to_string())),
        1 => reader.extract_to_memory(0),
        n => Err(Error::InvalidArgument(format!(
            "archive holds {n} items; use extract_item to pick one"
        ))),
    }
}

/// Content of the item at `index` in `archive`.
pub fn extract_item(archive: impl AsRef<Path>, index: usize) -> Result<Vec<u8>> {
    ArchiveReader::open(archive)?.extract_to_memory(index)
}

/// Metadata of every item in `archive`.
pub fn list(archive: impl AsRef<Path>) -> Result<Vec<ArchiveItemInfo>> {
    ArchiveReader::open(archive)?.items()
}

/// Metadata of every item in an archive with an encrypted listing.
pub fn list_with_password(
    archive: impl AsRef<Path>,
    password: &str,
) -> Result<Vec<ArchiveItemInfo>> {
    ArchiveReader::open_with_password(archive, password)?.items()
}

/// Verifies every item of `archive`.
///
/// Returns `Ok(false)` when some item fails to decode; errors are reserved
/// for archives that cannot be opened at all.
pub fn test_archive(archive: impl AsRef<Path>) -> Result<bool> {
    Ok(ArchiveReader::open(archive)?.test()?.is_ok())
}

/// Verifies every item of an encrypted `archive`.
pub fn test_archive_with_password(archive: impl AsRef<Path>, password: &str) -> Result<bool> {
    let mut reader = ArchiveReader::open_with_password(archive, password)?;
    match reader.test() {
        Ok(summary) => Ok(summary.is_ok()),
        Err(e) if e.code() == ErrorCode::WrongPassword => Ok(false),
        Err(e) => Err(e),
    }
}

/// Archive-level summary of `archive`.
pub fn archive_info(archive: impl AsRef<Path>) -> Result<ArchiveInfo> {
    ArchiveReader::open(archive)?.info()
}

/// Returns true if `path` is a regular file that opens as a supported
/// archive.
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    path.is_file() && ArchiveReader::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_round_trip() {
        let packed =
            compress_data(b"hello", ArchiveFormat::SevenZip, CompressionLevel::Fast).unwrap();
        let mut reader = ArchiveReader::open_buffer(packed).unwrap();
        assert_eq!(reader.item_info(0).unwrap().path, DATA_ITEM_NAME);
        assert_eq!(reader.extract_to_memory(0).unwrap(), b"hello");
    }

    #[test]
    fn file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("single.txt");
        std::fs::write(&source, b"only one").unwrap();
        let archive = dir.path().join("single.zip");
        compress_with(&source, &archive, ArchiveFormat::Zip, CompressionLevel::Normal, None)
            .unwrap();

        assert!(is_archive(&archive));
        assert!(!is_archive(&source));
        assert!(!is_archive(dir.path()));
        assert!(test_archive(&archive).unwrap());
        assert_eq!(extract_single_file(&archive).unwrap(), b"only one");
        assert_eq!(list(&archive).unwrap()[0].path, "single.txt");
        assert_eq!(archive_info(&archive).unwrap().format, ArchiveFormat::Zip);
    }

    #[test]
    fn directory_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("inner")).unwrap();
        std::fs::write(tree.join("inner/x.txt"), b"x").unwrap();
        let archive = dir.path().join("tree.7z");
        compress(&tree, &archive).unwrap();

        assert!(extract_single_file(&archive).is_err());
        let out = dir.path().join("out");
        let summary = extract(&archive, &out).unwrap();
        assert_eq!(summary.items_extracted, 3);
        assert_eq!(std::fs::read(out.join("tree/inner/x.txt")).unwrap(), b"x");
    }

    #[test]
    fn missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = compress(dir.path().join("nope"), dir.path().join("a.7z")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileNotFound);
    }
}
