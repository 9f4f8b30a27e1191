//! Turning file system paths into queued items.

use std::path::Path;

use walkdir::WalkDir;

use super::item::UpdateItemInfo;
use crate::{Error, Result};

/// Last component of `path`, used as the archive name of added files and
/// directories.
pub(super) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::InvalidArgument(format!("{} has no file name", path.display()))
        })
}

/// Items for `root` and everything below it, or only its direct children
/// when `recursive` is false.
///
/// The directory itself comes first, then its children in name order, each
/// stored as `archive_root/relative/path`. Symbolic links and special files
/// are skipped.
pub(super) fn walk_directory(
    root: &Path,
    archive_root: &str,
    recursive: bool,
) -> Result<Vec<UpdateItemInfo>> {
    let metadata = std::fs::metadata(root).map_err(|e| Error::io_at(e, root))?;
    if !metadata.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut items = Vec::new();
    let walk = WalkDir::new(root)
        .follow_links(false)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();
    for entry in walk {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io_at(e.into(), &path)
        })?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let archive_path = archive_name(archive_root, relative);

        let kind = entry.file_type();
        if kind.is_dir() {
            items.push(UpdateItemInfo::directory_from(entry.path(), &archive_path)?);
        } else if kind.is_file() {
            items.push(UpdateItemInfo::from_file(entry.path(), &archive_path)?);
        } else {
            log::debug!("skipping {}: not a regular file", entry.path().display());
        }
    }
    Ok(items)
}

fn archive_name(root: &str, relative: &Path) -> String {
    let mut name = root.trim_end_matches(['/', '\\']).to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn directory_entry_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("b.txt"), b"b").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), b"ccc").unwrap();

        let items = walk_directory(&root, "tree", true).unwrap();
        let paths: Vec<&str> = items.iter().map(|item| item.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "tree",
                "tree/a.txt",
                "tree/b.txt",
                "tree/sub",
                "tree/sub/deeper",
                "tree/sub/deeper/c.txt",
            ]
        );
        assert!(items[0].is_dir);
        assert_eq!(items[5].size, 3);
    }

    #[test]
    fn shallow_walk_stops_at_children() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/deep.txt"), b"d").unwrap();
        fs::write(dir.path().join("top.txt"), b"t").unwrap();
        let items = walk_directory(dir.path(), "r", false).unwrap();
        let paths: Vec<&str> = items.iter().map(|item| item.path.as_str()).collect();
        assert_eq!(paths, ["r", "r/sub", "r/top.txt"]);
    }

    #[test]
    fn custom_root_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"x").unwrap();
        let items = walk_directory(dir.path(), "backup/", true).unwrap();
        assert_eq!(items[0].path.as_str(), "backup");
        assert_eq!(items[1].path.as_str(), "backup/x");
    }

    #[test]
    fn files_are_not_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"").unwrap();
        assert!(walk_directory(&file, "plain", true).is_err());
        assert!(walk_directory(&dir.path().join("missing"), "m", true).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real"), b"r").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        let items = walk_directory(dir.path(), "d", true).unwrap();
        assert!(items.iter().all(|item| item.path.as_str() != "d/link"));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn root_without_name() {
        assert!(file_name(Path::new("/")).is_err());
        assert_eq!(file_name(Path::new("some/dir")).unwrap(), "dir");
    }
}
