//! Round-trip tests: what goes into an archive comes back out unchanged.

mod common;

use proptest::prelude::*;
use szbridge::{ArchiveFormat, ArchiveReader, ArchiveWriter, CompressionLevel, convenience};

use common::{MULTI_ITEM_FORMATS, STREAM_FORMATS};

#[test]
fn test_hello_7zip() {
    let bytes = common::write_archive(ArchiveFormat::SevenZip, &[("test.txt", b"Hello, 7-Zip!")]).unwrap();
    let mut reader = ArchiveReader::open_buffer(bytes).unwrap();

    assert_eq!(reader.format(), ArchiveFormat::SevenZip);
    assert_eq!(reader.item_count(), 1);
    let item = reader.item_info(0).unwrap();
    assert_eq!(item.path, "test.txt");
    assert_eq!(item.size, 13);
    assert!(!item.is_dir);

    let data = reader.extract_to_memory(0).unwrap();
    assert_eq!(data, b"Hello, 7-Zip!");
    assert_eq!(data.len(), 13);
}

#[test]
fn test_empty_and_single_byte_payloads() {
    for format in MULTI_ITEM_FORMATS {
        let entries: [(&str, &[u8]); 2] = [("empty.bin", b""), ("one.bin", b"x")];
        let bytes = common::write_archive(format, &entries).unwrap();
        common::verify_archive_contents(bytes, &entries);
    }
    for format in STREAM_FORMATS {
        for payload in [&b""[..], &b"x"[..]] {
            let bytes = common::write_archive(format, &[("payload", payload)]).unwrap();
            let mut reader = ArchiveReader::open_buffer(bytes).unwrap();
            assert_eq!(reader.item_count(), 1, "{format}");
            assert_eq!(reader.extract_to_memory(0).unwrap(), payload, "{format}");
        }
    }
}

#[test]
fn test_empty_archive() {
    for format in MULTI_ITEM_FORMATS {
        let bytes = common::write_archive(format, &[]).unwrap();
        let reader = ArchiveReader::open_buffer_with_format(bytes, format).unwrap();
        assert_eq!(reader.item_count(), 0, "{format}");
    }
}

#[test]
fn test_unicode_and_deep_paths() {
    let entries: [(&str, &[u8]); 3] = [
        ("日本語/ファイル.txt", "こんにちは".as_bytes()),
        ("ελληνικά/αρχείο.txt", b"greek"),
        ("a/b/c/d/e/f/g/deep.txt", b"Deeply nested file"),
    ];
    for format in MULTI_ITEM_FORMATS {
        let bytes = common::write_archive(format, &entries).unwrap();
        common::verify_archive_contents(bytes, &entries);
    }
}

#[test]
fn test_incompressible_data_at_every_level() {
    let data = common::random_bytes(64 * 1024, 0xDEAD_BEEF);
    for level in [CompressionLevel::None, CompressionLevel::Fastest, CompressionLevel::Ultra] {
        for format in [ArchiveFormat::SevenZip, ArchiveFormat::Zip] {
            let packed = convenience::compress_data(&data, format, level).unwrap();
            let mut reader = ArchiveReader::open_buffer(packed).unwrap();
            assert_eq!(reader.extract_to_memory(0).unwrap(), data, "{format} at {level:?}");
        }
    }
}

#[test]
fn test_directory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let project = common::make_tree(dir.path());

    for format in MULTI_ITEM_FORMATS {
        let archive = dir.path().join(format!("project.{}", format.extension()));
        let mut writer = ArchiveWriter::create(&archive, format).unwrap();
        writer.add_directory(&project).unwrap();
        writer.finalize().unwrap();

        let out = dir.path().join(format!("out-{}", format.extension()));
        let summary = ArchiveReader::open(&archive).unwrap().extract_all(&out).unwrap();
        assert!(summary.is_ok(), "{format}: {:?}", summary.failures);
        common::assert_same_tree(&project, &out.join("project"));
        assert!(out.join("project/src/empty").is_dir(), "{format}");
    }
}

#[test]
fn test_item_info_is_stable() {
    let bytes = common::write_archive(
        ArchiveFormat::Zip,
        &[("a.txt", b"alpha"), ("b/c.txt", b"gamma")],
    )
    .unwrap();
    let mut reader = ArchiveReader::open_buffer(bytes).unwrap();
    for index in 0..reader.item_count() {
        let first = reader.item_info(index).unwrap();
        reader.extract_to_memory(index).unwrap();
        let second = reader.item_info(index).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.index, index);
    }
    assert!(reader.contains("b/c.txt"));
    assert_eq!(reader.find("b/c.txt").unwrap().unwrap().index, 1);
    assert!(reader.find("missing").unwrap().is_none());
}

#[test]
fn test_split_volumes_reassemble() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::random_bytes(40_000, 3);
    let archive = dir.path().join("big.7z");

    let mut writer = ArchiveWriter::create(&archive, ArchiveFormat::SevenZip).unwrap();
    writer.set_volume_size(16 * 1024).unwrap();
    writer.add_buffer("big.bin", data.clone()).unwrap();
    writer.finalize().unwrap();

    let volumes = writer.volumes().to_vec();
    assert!(volumes.len() >= 3);
    assert!(volumes[0].to_string_lossy().ends_with("big.7z.001"));
    assert!(!archive.exists());

    let mut reader = ArchiveReader::open(&volumes[0]).unwrap();
    let info = reader.info().unwrap();
    assert!(info.is_multi_volume);
    assert_eq!(info.volume_count as usize, volumes.len());
    assert_eq!(reader.extract_to_memory(0).unwrap(), data);
}

fn entries_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    proptest::collection::btree_map(
        "[a-z][a-z0-9_]{0,7}(/[a-z][a-z0-9_]{0,7}){0,2}\\.bin",
        proptest::collection::vec(any::<u8>(), 0..2048),
        1..5,
    )
    .prop_map(|map| map.into_iter().collect())
    .prop_filter("no path may be a prefix directory of another", |entries: &Vec<(String, Vec<u8>)>| {
        entries.iter().all(|(a, _)| {
            entries
                .iter()
                .all(|(b, _)| !b.starts_with(&format!("{a}/")))
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_multi_item_round_trip(
        entries in entries_strategy(),
        format_index in 0usize..3,
    ) {
        let format = MULTI_ITEM_FORMATS[format_index];
        let borrowed: Vec<(&str, &[u8])> =
            entries.iter().map(|(p, d)| (p.as_str(), d.as_slice())).collect();
        let bytes = common::write_archive(format, &borrowed).unwrap();
        let files = common::read_files(bytes).unwrap();
        prop_assert_eq!(files, entries);
    }

    #[test]
    fn prop_stream_round_trip(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        format_index in 0usize..3,
    ) {
        let format = STREAM_FORMATS[format_index];
        let bytes = common::write_archive(format, &[("payload.bin", payload.as_slice())]).unwrap();
        let mut reader = ArchiveReader::open_buffer(bytes).unwrap();
        prop_assert_eq!(reader.format(), format);
        prop_assert_eq!(reader.extract_to_memory(0).unwrap(), payload);
    }
}
