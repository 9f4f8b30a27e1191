//! Extraction options.

use crate::Password;
use crate::progress::ProgressReporter;

pub use super::path_safety::PathSafety;

/// Policy for handling existing files during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Fail the item if the file exists.
    #[default]
    Error,
    /// Skip files that already exist.
    Skip,
    /// Overwrite existing files.
    Overwrite,
}

/// Options for [`ArchiveReader::extract_all_with`](super::ArchiveReader::extract_all_with).
///
/// # Example
///
/// ```rust,no_run
/// use szbridge::ArchiveReader;
/// use szbridge::read::{ExtractOptions, OverwritePolicy};
///
/// let mut reader = ArchiveReader::open("backup.7z")?;
/// let options = ExtractOptions::new()
///     .overwrite(OverwritePolicy::Skip)
///     .password("secret");
/// let summary = reader.extract_all_with("out", options)?;
/// println!("{} items written", summary.items_extracted);
/// # Ok::<(), szbridge::Error>(())
/// ```
#[derive(Default)]
pub struct ExtractOptions {
    /// Policy for handling existing files.
    pub overwrite: OverwritePolicy,
    /// Path safety validation policy.
    pub path_safety: PathSafety,
    /// Set each extracted file's modification time from the archive.
    pub preserve_mtime: bool,
    /// Password for encrypted items; overrides the reader's password.
    pub password: Option<Password>,
    /// Progress reporter; overrides the reader's reporter.
    pub progress: Option<Box<dyn ProgressReporter>>,
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("overwrite", &self.overwrite)
            .field("path_safety", &self.path_safety)
            .field("preserve_mtime", &self.preserve_mtime)
            .field("password", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

impl ExtractOptions {
    /// Creates extraction options with default settings: existing files are
    /// an error, paths are validated strictly, modification times are kept.
    pub fn new() -> Self {
        Self {
            preserve_mtime: true,
            ..Self::default()
        }
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Sets the path safety policy.
    pub fn path_safety(mut self, policy: PathSafety) -> Self {
        self.path_safety = policy;
        self
    }

    /// Sets whether modification times are restored.
    pub fn preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the progress reporter.
    pub fn progress(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress = Some(Box::new(reporter));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let options = ExtractOptions::new();
        assert_eq!(options.overwrite, OverwritePolicy::Error);
        assert_eq!(options.path_safety, PathSafety::Strict);
        assert!(options.preserve_mtime);
        assert!(options.password.is_none());
    }

    #[test]
    fn debug_hides_password() {
        let text = format!("{:?}", ExtractOptions::new().password("hunter2"));
        assert!(!text.contains("hunter2"));
    }
}
