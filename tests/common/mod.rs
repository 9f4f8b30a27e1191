//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use szbridge::{ArchiveFormat, ArchiveReader, ArchiveWriter};

/// Formats that hold several items and can be written.
pub const MULTI_ITEM_FORMATS: [ArchiveFormat; 3] =
    [ArchiveFormat::SevenZip, ArchiveFormat::Zip, ArchiveFormat::Tar];

/// Single-stream formats available in the default build.
pub const STREAM_FORMATS: [ArchiveFormat; 3] =
    [ArchiveFormat::GZip, ArchiveFormat::BZip2, ArchiveFormat::Xz];

/// Bytes `0, 1, ..., 255, 0, 1, ...` of length `len`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// Incompressible bytes, deterministic per `seed`.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Writes `entries` into an in-memory archive of `format`.
pub fn write_archive(
    format: ArchiveFormat,
    entries: &[(&str, &[u8])],
) -> szbridge::Result<Vec<u8>> {
    let mut writer = ArchiveWriter::create_in_memory(format)?;
    for (name, data) in entries {
        writer.add_buffer(name, *data)?;
    }
    writer.finalize()?;
    writer.into_buffer()
}

/// Every file item of an in-memory archive as `(path, content)`, in archive
/// order.
pub fn read_files(bytes: Vec<u8>) -> szbridge::Result<Vec<(String, Vec<u8>)>> {
    let mut reader = ArchiveReader::open_buffer(bytes)?;
    let mut files = Vec::new();
    for item in reader.items()? {
        if !item.is_dir {
            let data = reader.extract_to_memory(item.index)?;
            files.push((item.path, data));
        }
    }
    Ok(files)
}

/// Asserts that `bytes` opens and holds exactly `entries`.
pub fn verify_archive_contents(bytes: Vec<u8>, entries: &[(&str, &[u8])]) {
    let files = read_files(bytes).expect("archive should read back");
    assert_eq!(files.len(), entries.len(), "item count");
    for ((path, data), (name, expected)) in files.iter().zip(entries) {
        assert_eq!(path, name);
        assert_eq!(data.as_slice(), *expected, "content of {name}");
    }
}

/// Creates this tree under `root` and returns `root/project`:
///
/// ```text
/// project/
///   README.md
///   src/main.rs
///   src/empty/
///   assets/blob.bin
/// ```
pub fn make_tree(root: &Path) -> PathBuf {
    let project = root.join("project");
    fs::create_dir_all(project.join("src/empty")).unwrap();
    fs::create_dir_all(project.join("assets")).unwrap();
    fs::write(project.join("README.md"), b"# project\n").unwrap();
    fs::write(project.join("src/main.rs"), b"fn main() {}\n").unwrap();
    fs::write(project.join("assets/blob.bin"), random_bytes(10_000, 7)).unwrap();
    project
}

/// Asserts that the files below `actual` match those below `expected`.
pub fn assert_same_tree(expected: &Path, actual: &Path) {
    for entry in walkdir::WalkDir::new(expected) {
        let entry = entry.unwrap();
        let relative = entry.path().strip_prefix(expected).unwrap();
        let counterpart = actual.join(relative);
        if entry.file_type().is_dir() {
            assert!(counterpart.is_dir(), "missing directory {}", counterpart.display());
        } else {
            assert_eq!(
                fs::read(entry.path()).unwrap(),
                fs::read(&counterpart).unwrap(),
                "content of {}",
                relative.display()
            );
        }
    }
}
