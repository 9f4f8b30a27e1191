//! Destination path validation for directory extraction.
//!
//! Archives are untrusted input: an item named `../../.bashrc` must never be
//! written outside the extraction directory.

use std::path::{Component, Path, PathBuf};

use crate::{ArchivePath, Error, Result};

/// Policy for validating extraction paths.
///
/// ```rust
/// use szbridge::read::PathSafety;
///
/// assert_eq!(PathSafety::default(), PathSafety::Strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSafety {
    /// Reject `..` segments, absolute paths and drive prefixes, then verify
    /// that the resolved path stays inside the destination even through
    /// symlinked directories.
    #[default]
    Strict,
    /// Reject `..` segments, absolute paths and drive prefixes without
    /// resolving symlinks.
    Relaxed,
    /// Join the stored path onto the destination as-is.
    ///
    /// Only for archives you created yourself: a hostile archive can write
    /// anywhere the process can.
    Disabled,
}

/// Resolves where the item at `entry_index` named `stored` should be written
/// under `dest_root`.
///
/// # Errors
///
/// [`Error::PathTraversal`] when the policy rejects the name, or an I/O error
/// if `dest_root` cannot be canonicalized in strict mode.
pub fn validate_extract_path(
    stored: &str,
    dest_root: &Path,
    policy: PathSafety,
    entry_index: usize,
) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        entry_index,
        path: stored.to_string(),
    };

    if policy == PathSafety::Disabled {
        return Ok(dest_root.join(stored));
    }

    let relative = ArchivePath::new(stored).map_err(|_| traversal())?;
    let full_path = dest_root.join(relative.as_str());
    if policy == PathSafety::Relaxed {
        return Ok(full_path);
    }

    let canonical_dest = dest_root
        .canonicalize()
        .map_err(|e| Error::io_at(e, dest_root))?;

    // Canonicalize the deepest existing ancestor and re-append the rest.
    let mut ancestor = full_path.as_path();
    let mut pending = Vec::new();
    while !ancestor.exists() {
        match (ancestor.file_name(), ancestor.parent()) {
            (Some(name), Some(parent)) => {
                pending.push(name.to_os_string());
                ancestor = parent;
            }
            _ => return Err(traversal()),
        }
    }
    let mut resolved = ancestor
        .canonicalize()
        .map_err(|e| Error::io_at(e, ancestor))?;
    for name in pending.into_iter().rev() {
        resolved.push(name);
    }

    if !resolved.starts_with(&canonical_dest)
        || resolved
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        log::warn!("rejecting item {entry_index}: '{stored}' resolves outside the destination");
        return Err(traversal());
    }
    Ok(full_path)
}
