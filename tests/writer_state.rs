//! Writer lifecycle: one-shot finalize, format limits and cancellation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use szbridge::{
    ArchiveFormat, ArchiveReader, ArchiveWriter, AtomicProgress, ErrorCode, ErrorKind,
    progress_fn,
};

#[test]
fn test_finalize_is_one_shot() {
    let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::Zip).unwrap();
    writer.add_buffer("first.txt", b"first".as_slice()).unwrap();
    writer.finalize().unwrap();
    assert!(writer.is_finalized());

    let err = writer.finalize().unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
    let err = writer.add_buffer("late.txt", b"late".as_slice()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
    assert_eq!(writer.set_password("x").unwrap_err().code(), ErrorCode::InvalidState);

    let files = common::read_files(writer.into_buffer().unwrap()).unwrap();
    assert_eq!(files, vec![("first.txt".to_string(), b"first".to_vec())]);
}

#[test]
fn test_file_target_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("once.tar");
    let mut writer = ArchiveWriter::create(&path, ArchiveFormat::Tar).unwrap();
    writer.add_buffer("a.txt", b"a".as_slice()).unwrap();
    writer.finalize().unwrap();
    let written = std::fs::read(&path).unwrap();

    assert!(writer.finalize().is_err());
    assert_eq!(std::fs::read(&path).unwrap(), written);
    assert_eq!(writer.take_buffer().unwrap_err().code(), ErrorCode::InvalidState);
}

#[test]
fn test_sevenz_only_settings_are_ignored_elsewhere() {
    for format in [ArchiveFormat::Zip, ArchiveFormat::Tar] {
        let mut writer = ArchiveWriter::create_in_memory(format).unwrap();
        writer.set_solid(true).unwrap();
        writer.set_encrypt_headers(true).unwrap();
        writer.add_buffer("plain.txt", b"still readable".as_slice()).unwrap();
        writer.finalize().unwrap();

        let reader =
            ArchiveReader::open_buffer_with_format(writer.into_buffer().unwrap(), format).unwrap();
        let info = reader.info().unwrap();
        assert!(!info.has_encrypted_header, "{format}");
        assert!(!info.is_solid, "{format}");
    }
}

#[test]
fn test_stream_formats_hold_one_file() {
    for format in common::STREAM_FORMATS {
        let mut writer = ArchiveWriter::create_in_memory(format).unwrap();
        writer.add_buffer("one", b"1".as_slice()).unwrap();
        writer.add_buffer("two", b"2".as_slice()).unwrap();
        let err = writer.finalize().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument, "{format}: {err:?}");

        let mut writer = ArchiveWriter::create_in_memory(format).unwrap();
        writer.add_empty_directory("dir").unwrap();
        assert!(writer.finalize().is_err(), "{format}");
    }
}

#[test]
fn test_read_only_formats_cannot_be_created() {
    for format in [ArchiveFormat::Rar, ArchiveFormat::Rar5, ArchiveFormat::Iso, ArchiveFormat::Cab]
    {
        let err = ArchiveWriter::create_in_memory(format).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported, "{format}");
    }
}

#[test]
fn test_invalid_settings_are_rejected() {
    let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
    assert_eq!(writer.set_level(10).unwrap_err().code(), ErrorCode::InvalidArgument);
    assert!(writer.set_volume_size(1024).unwrap_err().is_not_supported());
    assert!(writer.add_buffer("../outside.txt", b"x".as_slice()).is_err());
    assert!(writer.add_buffer("", b"x".as_slice()).is_err());
    assert!(writer.add_file("/definitely/not/here.txt").is_err());
    assert_eq!(writer.item_count(), 0);
}

#[test]
fn test_failed_write_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.zip");
    let source = dir.path().join("vanishing.txt");
    std::fs::write(&source, b"soon gone").unwrap();

    let mut writer = ArchiveWriter::create(&path, ArchiveFormat::Zip).unwrap();
    writer.add_file(&source).unwrap();
    std::fs::remove_file(&source).unwrap();

    let err = writer.finalize().unwrap_err();
    assert!(err.to_string().contains("vanishing.txt"), "{err}");
    assert!(!path.exists());
}

#[test]
fn test_progress_during_write() {
    let data = common::pattern(300_000);
    let progress = AtomicProgress::shared();
    let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
    writer.set_progress(Arc::clone(&progress)).unwrap();
    writer.add_buffer("a.bin", data.clone()).unwrap();
    writer.add_buffer("b.bin", data).unwrap();
    writer.finalize().unwrap();

    assert_eq!(progress.total_bytes(), 600_000);
    assert_eq!(progress.completed_bytes(), 600_000);
    assert_eq!(progress.items_completed(), 2);
}

#[test]
fn test_cancelled_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancelled.zip");
    let calls = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&calls);

    let mut writer = ArchiveWriter::create(&path, ArchiveFormat::Zip).unwrap();
    writer
        .set_progress(progress_fn(move |done, _| {
            seen.fetch_add(1, Ordering::Relaxed);
            done < 100_000
        }))
        .unwrap();
    writer.add_buffer("big.bin", common::random_bytes(1 << 20, 9)).unwrap();

    let err = writer.finalize().unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert!(calls.load(Ordering::Relaxed) > 0);
    assert!(!path.exists());
}

#[test]
fn test_links_per_format() {
    let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::Tar).unwrap();
    writer.add_buffer("lib/libdemo.so.1", b"elf".as_slice()).unwrap();
    writer.add_symlink("lib/libdemo.so", "libdemo.so.1").unwrap();
    writer.add_hard_link("lib/libdemo-copy.so", "lib/libdemo.so.1").unwrap();
    assert_eq!(writer.item_count(), 3);
    writer.finalize().unwrap();
    // Link entries are not listed when reading.
    let files = common::read_files(writer.into_buffer().unwrap()).unwrap();
    assert_eq!(files, vec![("lib/libdemo.so.1".to_string(), b"elf".to_vec())]);

    for format in [ArchiveFormat::SevenZip, ArchiveFormat::Zip] {
        let mut writer = ArchiveWriter::create_in_memory(format).unwrap();
        writer.add_buffer("real.txt", b"real".as_slice()).unwrap();
        writer.add_symlink("link.txt", "real.txt").unwrap();
        writer.finalize().unwrap();
        let reader = ArchiveReader::open_buffer(writer.into_buffer().unwrap()).unwrap();
        assert_eq!(reader.item_count(), 2, "{format}");

        let mut writer = ArchiveWriter::create_in_memory(format).unwrap();
        writer.add_buffer("real.txt", b"real".as_slice()).unwrap();
        writer.add_hard_link("alias.txt", "real.txt").unwrap();
        assert!(writer.finalize().unwrap_err().is_not_supported(), "{format}");
    }

    let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::GZip).unwrap();
    writer.add_symlink("link", "target").unwrap();
    assert!(writer.finalize().unwrap_err().is_not_supported());
    assert!(writer.add_symlink("late", "target").is_err());
}

#[test]
fn test_default_sevenz_keeps_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    let blob = dir.path().join("blob.bin");
    std::fs::write(&notes, b"from disk").unwrap();
    std::fs::write(&blob, common::random_bytes(40_000, 3)).unwrap();

    let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
    writer.add_buffer("a.txt", b"alpha".as_slice()).unwrap();
    writer.add_buffer("b.txt", b"bravo".as_slice()).unwrap();
    writer.add_file(&notes).unwrap();
    writer.add_file(&blob).unwrap();
    writer.add_buffer("c.bin", common::pattern(70_000)).unwrap();
    writer.finalize().unwrap();

    let bytes = writer.into_buffer().unwrap();
    let reader = ArchiveReader::open_buffer(bytes.clone()).unwrap();
    assert!(reader.info().unwrap().is_solid);
    common::verify_archive_contents(
        bytes,
        &[
            ("a.txt", b"alpha"),
            ("b.txt", b"bravo"),
            ("notes.txt", b"from disk"),
            ("blob.bin", &common::random_bytes(40_000, 3)),
            ("c.bin", &common::pattern(70_000)),
        ],
    );
}

#[test]
fn test_items_keep_insertion_order() {
    for solid in [false, true] {
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
        writer.set_solid(solid).unwrap();
        writer.add_buffer("first.txt", b"1".as_slice()).unwrap();
        writer.add_empty_directory("second").unwrap();
        writer.add_buffer("third.txt", b"".as_slice()).unwrap();
        writer.add_buffer("fourth.txt", b"4".as_slice()).unwrap();
        writer.finalize().unwrap();

        let mut reader = ArchiveReader::open_buffer(writer.into_buffer().unwrap()).unwrap();
        let paths: Vec<String> = reader.items().unwrap().into_iter().map(|i| i.path).collect();
        assert_eq!(paths, ["first.txt", "second", "third.txt", "fourth.txt"], "solid={solid}");
        assert_eq!(reader.extract_to_memory(0).unwrap(), b"1");
        assert_eq!(reader.extract_to_memory(2).unwrap(), b"");
        assert_eq!(reader.extract_to_memory(3).unwrap(), b"4");
    }
}

#[test]
fn test_file_that_grew_after_queueing() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, b"").unwrap();

    for solid in [false, true] {
        let mut writer = ArchiveWriter::create_in_memory(ArchiveFormat::SevenZip).unwrap();
        writer.set_solid(solid).unwrap();
        writer.add_file(&log).unwrap();
        writer.add_buffer("other.txt", b"other".as_slice()).unwrap();
        std::fs::write(&log, b"lines written later").unwrap();
        writer.finalize().unwrap();

        let files = common::read_files(writer.into_buffer().unwrap()).unwrap();
        assert_eq!(files[0], ("app.log".to_string(), b"lines written later".to_vec()), "solid={solid}");
        std::fs::write(&log, b"").unwrap();
    }
}
