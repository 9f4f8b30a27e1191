//! Archive-relative item paths.

use std::fmt;

use crate::{Error, Result};

/// Upper bound on a stored path, in bytes.
const MAX_PATH_LENGTH: usize = 32768;

/// A normalized archive-relative path.
///
/// Paths are stored with forward slashes. Construction converts backslashes,
/// drops `.` and empty segments, and rejects anything that could point
/// outside the archive root.
///
/// ```
/// use szbridge::ArchivePath;
///
/// let path = ArchivePath::new("dir\\sub/./file.txt").unwrap();
/// assert_eq!(path.as_str(), "dir/sub/file.txt");
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("/etc/passwd").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Normalizes and validates `s`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for empty paths, NUL bytes, absolute paths,
    /// drive prefixes, `..` segments and paths longer than 32 KiB.
    pub fn new(s: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidArgument(format!("archive path '{s}': {why}"));

        if s.contains('\0') {
            return Err(invalid("contains NUL byte"));
        }
        if s.len() > MAX_PATH_LENGTH {
            return Err(invalid("too long"));
        }
        let unified = s.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(invalid("absolute path not allowed"));
        }
        if has_drive_prefix(&unified) {
            return Err(invalid("drive prefix not allowed"));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(invalid("parent segment not allowed")),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(invalid("empty path"));
        }
        Ok(Self(segments.join("/")))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a child segment (or relative path) with a forward slash.
    pub fn join(&self, child: &str) -> Result<Self> {
        Self::new(&format!("{}/{}", self.0, child))
    }

    /// Returns the last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the parent path, or `None` at the top level.
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|pos| Self(self.0[..pos].to_string()))
    }

    /// Iterates over the path segments.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ArchivePath> for String {
    fn from(path: ArchivePath) -> String {
        path.0
    }
}
