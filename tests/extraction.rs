//! Extraction to directories: layout, hardening and overwrite policies.

mod common;

use std::fs;
use std::io::Write;

use szbridge::read::PathSafety;
use szbridge::{
    ArchiveFormat, ArchiveReader, AtomicProgress, Error, ErrorCode, ExtractOptions,
    OverwritePolicy, progress_fn,
};

/// A zip holding `good.txt`, a `../escape.txt` entry and `after.txt`,
/// written with the `zip` crate directly since this crate refuses to store
/// such names.
fn zip_with_traversal() -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut out);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in [
            ("good.txt", b"good".as_slice()),
            ("../escape.txt", b"evil".as_slice()),
            ("after.txt", b"after".as_slice()),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    out.into_inner()
}

#[test]
fn test_traversal_is_rejected_per_item() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dest");
    let mut reader = ArchiveReader::open_buffer(zip_with_traversal()).unwrap();
    assert_eq!(reader.item_info(1).unwrap().path, "../escape.txt");

    let summary = reader.extract_all(&dest).unwrap();
    assert_eq!(summary.items_extracted, 2);
    assert_eq!(summary.items_failed, 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.index, 1);
    assert!(matches!(failure.error, Error::PathTraversal { entry_index: 1, .. }));
    assert_eq!(failure.error.code(), ErrorCode::AccessDenied);

    assert!(!dir.path().join("escape.txt").exists());
    assert_eq!(fs::read(dest.join("good.txt")).unwrap(), b"good");
    assert_eq!(fs::read(dest.join("after.txt")).unwrap(), b"after");

    let err = summary.into_result().unwrap_err();
    assert_eq!(err.entry_index(), Some(1));
}

#[test]
fn test_relaxed_safety_still_rejects_parent_segments() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = ArchiveReader::open_buffer(zip_with_traversal()).unwrap();
    let options = ExtractOptions::new().path_safety(PathSafety::Relaxed);
    let summary = reader.extract_all_with(dir.path().join("d"), options).unwrap();
    assert_eq!(summary.items_failed, 1);
    assert!(!dir.path().join("escape.txt").exists());
}

#[test]
fn test_extract_items_keeps_layout() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::write_archive(
        ArchiveFormat::Tar,
        &[("a/one.txt", b"1"), ("b/two.txt", b"2"), ("c/three.txt", b"3")],
    )
    .unwrap();
    let mut reader = ArchiveReader::open_buffer_with_format(bytes, ArchiveFormat::Tar).unwrap();

    let summary = reader.extract_items(&[0, 2], dir.path()).unwrap();
    assert_eq!(summary.items_extracted, 2);
    assert_eq!(fs::read(dir.path().join("a/one.txt")).unwrap(), b"1");
    assert!(!dir.path().join("b").exists());
    assert_eq!(fs::read(dir.path().join("c/three.txt")).unwrap(), b"3");

    let err = reader.extract_items(&[0, 9], dir.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
fn test_extract_to_file_and_directory_items() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = szbridge::ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
    writer.add_empty_directory("folder").unwrap();
    writer.add_buffer("folder/file.txt", b"content".as_slice()).unwrap();
    writer.finalize().unwrap();
    let mut reader = ArchiveReader::open_buffer(writer.into_buffer().unwrap()).unwrap();

    let file = reader.find("folder/file.txt").unwrap().unwrap();
    let folder = reader.find("folder").unwrap().unwrap();
    assert!(folder.is_dir);

    let target = dir.path().join("renamed.txt");
    reader.extract_to_file(file.index, &target).unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"content");

    assert!(reader.extract_to_memory(folder.index).is_err());
    assert!(reader.extract_to_memory(2).is_err());
}

#[test]
fn test_overwrite_policies() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::write_archive(ArchiveFormat::Zip, &[("same.txt", b"archived")]).unwrap();
    let existing = dir.path().join("same.txt");

    fs::write(&existing, b"local").unwrap();
    let mut reader = ArchiveReader::open_buffer(bytes).unwrap();
    let summary = reader
        .extract_all_with(dir.path(), ExtractOptions::new().overwrite(OverwritePolicy::Skip))
        .unwrap();
    assert_eq!(summary.items_skipped, 1);
    assert_eq!(fs::read(&existing).unwrap(), b"local");

    let summary = reader
        .extract_all_with(dir.path(), ExtractOptions::new().overwrite(OverwritePolicy::Error))
        .unwrap();
    assert_eq!(summary.items_failed, 1);
    assert_eq!(fs::read(&existing).unwrap(), b"local");

    let summary = reader.extract_all(dir.path()).unwrap();
    assert!(summary.is_ok());
    assert_eq!(fs::read(&existing).unwrap(), b"archived");
}

#[test]
fn test_corrupt_item_does_not_stop_the_rest() {
    let first = common::random_bytes(4096, 11);
    let bytes = common::write_archive(
        ArchiveFormat::Zip,
        &[("first.bin", &first), ("second.txt", b"second item")],
    )
    .unwrap();

    // Flip bytes inside the first item's data, after its local header.
    let mut damaged = bytes.clone();
    let start = 30 + "first.bin".len() + 100;
    for byte in &mut damaged[start..start + 16] {
        *byte ^= 0xFF;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut reader = ArchiveReader::open_buffer(damaged).unwrap();
    let summary = reader.extract_all(dir.path()).unwrap();
    assert_eq!(summary.items_failed, 1);
    assert!(summary.failures[0].error.is_data(), "{:?}", summary.failures[0].error);
    assert_eq!(fs::read(dir.path().join("second.txt")).unwrap(), b"second item");
    assert!(!dir.path().join("first.bin").exists());

    assert!(!reader.test().unwrap().is_ok());
    assert!(reader.extract_to_memory(0).unwrap_err().is_data());
}

#[test]
fn test_progress_and_cancellation() {
    let data = common::random_bytes(512 * 1024, 5);
    let bytes = common::write_archive(ArchiveFormat::Zip, &[("big.bin", &data)]).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let progress = AtomicProgress::shared();
    let mut reader = ArchiveReader::open_buffer(bytes.clone()).unwrap();
    reader.set_progress(std::sync::Arc::clone(&progress));
    reader.extract_all(dir.path().join("full")).unwrap();
    assert_eq!(progress.completed_bytes(), data.len() as u64);

    let mut reader = ArchiveReader::open_buffer(bytes).unwrap();
    let options = ExtractOptions::new().progress(progress_fn(|done, _| done < 64 * 1024));
    let err = reader
        .extract_all_with(dir.path().join("cancelled"), options)
        .unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert_eq!(err.code(), ErrorCode::OperationCancelled);
}
