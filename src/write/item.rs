//! Items queued for writing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::property::attributes;
use crate::{ArchivePath, Error, Result, Timestamp};

/// Where a file item's data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Read from this file when the archive is written.
    SourcePath(PathBuf),
    /// Bytes held in memory.
    InMemory(Arc<[u8]>),
    /// No data: the item is a directory or a link.
    None,
}

/// Target of a link item, stored as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Symbolic link; the target may be relative to the link's directory.
    Symbolic(String),
    /// Hard link to another item of the same archive.
    Hard(String),
}

impl LinkTarget {
    /// The target path.
    pub fn target(&self) -> &str {
        match self {
            Self::Symbolic(target) | Self::Hard(target) => target,
        }
    }
}

/// What an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Directory,
    SymLink,
    HardLink,
}

/// One item to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateItemInfo {
    /// Normalized path inside the archive.
    pub path: ArchivePath,
    /// Whether the item is a directory.
    pub is_dir: bool,
    /// Data size in bytes; 0 for directories.
    pub size: u64,
    /// Attribute bits (see [`crate::property::attributes`]).
    pub attributes: Option<u32>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Last access time.
    pub accessed: Option<Timestamp>,
    /// Modification time.
    pub modified: Option<Timestamp>,
    /// Data source.
    pub source: FileSource,
    /// Link target for link items.
    pub link: Option<LinkTarget>,
}

impl UpdateItemInfo {
    /// Describes the file at `source`, stored as `path`.
    ///
    /// Size, times and permissions are taken from the file system now; the
    /// data is read when the archive is written.
    pub fn from_file(source: impl AsRef<Path>, path: &str) -> Result<Self> {
        let source = source.as_ref();
        let metadata = std::fs::metadata(source).map_err(|e| Error::io_at(e, source))?;
        if metadata.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "{} is a directory",
                source.display()
            )));
        }
        Ok(Self {
            path: ArchivePath::new(path)?,
            is_dir: false,
            size: metadata.len(),
            attributes: Some(file_attributes(&metadata)),
            created: metadata.created().ok().and_then(Timestamp::from_system_time),
            accessed: metadata.accessed().ok().and_then(Timestamp::from_system_time),
            modified: metadata.modified().ok().and_then(Timestamp::from_system_time),
            source: FileSource::SourcePath(source.to_path_buf()),
            link: None,
        })
    }

    /// A file item with in-memory content, stamped with the current time.
    pub fn from_buffer(path: &str, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        Ok(Self {
            path: ArchivePath::new(path)?,
            is_dir: false,
            size: data.len() as u64,
            attributes: Some(attributes::NORMAL),
            created: None,
            accessed: None,
            modified: Some(Timestamp::now()),
            source: FileSource::InMemory(data),
            link: None,
        })
    }

    /// A directory item, stamped with the current time.
    pub fn directory(path: &str) -> Result<Self> {
        Ok(Self {
            path: ArchivePath::new(path)?,
            is_dir: true,
            size: 0,
            attributes: Some(attributes::DIRECTORY),
            created: None,
            accessed: None,
            modified: Some(Timestamp::now()),
            source: FileSource::None,
            link: None,
        })
    }

    /// A symbolic link stored as `path`, pointing at `target`.
    pub fn symlink(path: &str, target: &str) -> Result<Self> {
        Self::link_item(path, LinkTarget::Symbolic(target.to_string()))
    }

    /// A hard link stored as `path`, sharing the data of the archive item
    /// `target`.
    pub fn hard_link(path: &str, target: &str) -> Result<Self> {
        let target = ArchivePath::new(target)?;
        Self::link_item(path, LinkTarget::Hard(target.as_str().to_string()))
    }

    fn link_item(path: &str, link: LinkTarget) -> Result<Self> {
        if link.target().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "link '{path}' has an empty target"
            )));
        }
        Ok(Self {
            path: ArchivePath::new(path)?,
            is_dir: false,
            size: 0,
            attributes: Some(attributes::ARCHIVE),
            created: None,
            accessed: None,
            modified: Some(Timestamp::now()),
            source: FileSource::None,
            link: Some(link),
        })
    }

    /// What the item represents.
    pub fn kind(&self) -> ItemKind {
        match (&self.link, self.is_dir) {
            (Some(LinkTarget::Symbolic(_)), _) => ItemKind::SymLink,
            (Some(LinkTarget::Hard(_)), _) => ItemKind::HardLink,
            (None, true) => ItemKind::Directory,
            (None, false) => ItemKind::File,
        }
    }

    /// A directory item carrying the times and permissions of `source`.
    pub(crate) fn directory_from(source: &Path, path: &str) -> Result<Self> {
        let metadata = std::fs::metadata(source).map_err(|e| Error::io_at(e, source))?;
        Ok(Self {
            attributes: Some(file_attributes(&metadata)),
            created: metadata.created().ok().and_then(Timestamp::from_system_time),
            accessed: metadata.accessed().ok().and_then(Timestamp::from_system_time),
            modified: metadata.modified().ok().and_then(Timestamp::from_system_time),
            ..Self::directory(path)?
        })
    }

    /// Checks that the data source matches the item kind: directories and
    /// links have none, a file has exactly one.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.link.is_some() {
            return match (&self.source, self.is_dir) {
                (FileSource::None, false) => Ok(()),
                (_, true) => Err(Error::InvalidArgument(format!(
                    "directory item '{}' cannot be a link",
                    self.path
                ))),
                _ => Err(Error::InvalidArgument(format!(
                    "link item '{}' cannot carry data",
                    self.path
                ))),
            };
        }
        match (&self.source, self.is_dir) {
            (FileSource::None, true) => Ok(()),
            (FileSource::None, false) => Err(Error::InvalidArgument(format!(
                "file item '{}' has no data source",
                self.path
            ))),
            (_, true) => Err(Error::InvalidArgument(format!(
                "directory item '{}' cannot carry data",
                self.path
            ))),
            (FileSource::InMemory(data), false) if data.len() as u64 != self.size => {
                Err(Error::InvalidArgument(format!(
                    "item '{}' declares {} bytes but holds {}",
                    self.path,
                    self.size,
                    data.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

fn file_attributes(metadata: &std::fs::Metadata) -> u32 {
    let mut windows = if metadata.is_dir() {
        attributes::DIRECTORY
    } else {
        attributes::ARCHIVE
    };
    if metadata.permissions().readonly() {
        windows |= attributes::READONLY;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        attributes::with_unix_mode(windows, metadata.mode())
    }
    #[cfg(not(unix))]
    {
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_and_directories() {
        let item = UpdateItemInfo::from_buffer("a\\b.txt", b"hello".to_vec()).unwrap();
        assert_eq!(item.path.as_str(), "a/b.txt");
        assert_eq!(item.size, 5);
        item.validate().unwrap();

        let dir = UpdateItemInfo::directory("a").unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.source, FileSource::None);
        dir.validate().unwrap();
    }

    #[test]
    fn mismatched_sources_are_rejected() {
        let mut item = UpdateItemInfo::directory("d").unwrap();
        item.is_dir = false;
        assert!(item.validate().is_err());

        let mut dir = UpdateItemInfo::from_buffer("f", vec![1]).unwrap();
        dir.is_dir = true;
        assert!(dir.validate().is_err());

        let mut short = UpdateItemInfo::from_buffer("f", vec![1, 2]).unwrap();
        short.size = 10;
        assert!(short.validate().is_err());
    }

    #[test]
    fn links_carry_targets_only() {
        let link = UpdateItemInfo::symlink("bin/tool", "../lib/tool-1.2").unwrap();
        assert_eq!(link.kind(), ItemKind::SymLink);
        assert_eq!(link.link.as_ref().map(LinkTarget::target), Some("../lib/tool-1.2"));
        link.validate().unwrap();

        let hard = UpdateItemInfo::hard_link("copy.txt", "dir\\orig.txt").unwrap();
        assert_eq!(hard.kind(), ItemKind::HardLink);
        assert_eq!(hard.link, Some(LinkTarget::Hard("dir/orig.txt".into())));
        assert!(UpdateItemInfo::hard_link("copy.txt", "../orig.txt").is_err());
        assert!(UpdateItemInfo::symlink("empty", "").is_err());

        let mut with_data = link.clone();
        with_data.source = FileSource::InMemory(Arc::from(&b"x"[..]));
        assert!(with_data.validate().is_err());
        let mut as_dir = link;
        as_dir.is_dir = true;
        assert!(as_dir.validate().is_err());
        assert_eq!(UpdateItemInfo::directory("d").unwrap().kind(), ItemKind::Directory);
    }

    #[test]
    fn bad_paths_are_rejected() {
        assert!(UpdateItemInfo::from_buffer("../x", vec![]).is_err());
        assert!(UpdateItemInfo::directory("").is_err());
    }

    #[test]
    fn files_take_metadata_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"12345").unwrap();
        let item = UpdateItemInfo::from_file(&path, "f.txt").unwrap();
        assert_eq!(item.size, 5);
        assert!(item.modified.is_some());
        assert_eq!(item.source, FileSource::SourcePath(path));
        assert!(UpdateItemInfo::from_file(dir.path(), "d").is_err());
    }
}
