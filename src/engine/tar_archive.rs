//! TAR handler backed by the `tar` crate.
//!
//! Entry data offsets are recorded while the headers are scanned, so
//! extraction seeks straight to each selected entry.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tar::{Archive, Builder, EntryType, Header};

use super::extract::ExtractSession;
use super::record::{ArchiveRecord, ItemRecord, item_at, normalize_name, resolve_indices};
use super::update::{self, PendingItem, ProgressReader};
use super::{
    EngineCode, EngineFailure, EngineResult, ExtractCallback, InArchive, OpenCallback,
    OutArchive, UpdateCallback, prop_names,
};
use crate::Timestamp;
use crate::property::{PropId, PropValue, attributes};
use crate::stream::{InStream, OutStream};

fn header_failure(error: io::Error) -> EngineFailure {
    match error.kind() {
        io::ErrorKind::UnexpectedEof => {
            EngineFailure::new(EngineCode::HANDLE_EOF, format!("truncated tar archive: {error}"))
        }
        io::ErrorKind::Other | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            EngineFailure::new(EngineCode::NOT_ARCHIVE, format!("invalid tar archive: {error}"))
        }
        _ => error.into(),
    }
}

/// TAR reader.
#[derive(Default)]
pub(crate) struct TarIn {
    stream: Option<Box<dyn InStream>>,
    items: Vec<ItemRecord>,
    offsets: Vec<u64>,
    info: ArchiveRecord,
}

impl InArchive for TarIn {
    fn open(
        &mut self,
        mut stream: Box<dyn InStream>,
        _callback: &mut dyn OpenCallback,
    ) -> EngineResult<()> {
        let physical_size = stream.size()?;
        let mut archive = Archive::new(stream);
        let mut items = Vec::new();
        let mut offsets = Vec::new();
        for entry in archive.entries_with_seek().map_err(header_failure)? {
            let entry = entry.map_err(header_failure)?;
            let header = entry.header();
            let entry_type = header.entry_type();
            let is_dir = match entry_type {
                EntryType::Directory => true,
                EntryType::Regular | EntryType::Continuous => false,
                other => {
                    log::debug!(
                        "skipping tar entry {} of type {other:?}",
                        String::from_utf8_lossy(&entry.path_bytes())
                    );
                    continue;
                }
            };
            let path = normalize_name(&String::from_utf8_lossy(&entry.path_bytes()));
            if path.is_empty() {
                continue;
            }
            let mode = header.mode().ok();
            let base = if is_dir {
                attributes::DIRECTORY
            } else {
                attributes::ARCHIVE
            };
            let size = if is_dir { 0 } else { entry.size() };
            items.push(ItemRecord {
                path,
                is_dir,
                size,
                packed_size: size,
                modified: header
                    .mtime()
                    .ok()
                    .and_then(|secs| i64::try_from(secs).ok())
                    .and_then(Timestamp::from_unix_secs),
                attributes: Some(match mode {
                    Some(mode) => attributes::with_unix_mode(base, mode),
                    None => base,
                }),
                ..ItemRecord::default()
            });
            offsets.push(entry.raw_file_position());
        }
        self.info = ArchiveRecord {
            physical_size,
            ..ArchiveRecord::default()
        };
        log::debug!("opened tar archive: {} items", items.len());
        self.items = items;
        self.offsets = offsets;
        self.stream = Some(archive.into_inner());
        Ok(())
    }

    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn item_property(&self, index: usize, id: PropId) -> EngineResult<PropValue> {
        Ok(item_at(&self.items, index)?.property(id))
    }

    fn archive_property(&self, id: PropId) -> EngineResult<PropValue> {
        Ok(self.info.property(id))
    }

    fn extract(
        &mut self,
        indices: Option<&[usize]>,
        test: bool,
        callback: &mut dyn ExtractCallback,
    ) -> EngineResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(EngineFailure::new(EngineCode::E_UNEXPECTED, "archive is not open"));
        };
        let selected = resolve_indices(indices, self.items.len())?;
        let mut session = ExtractSession::begin(callback, &self.items, &selected, test)?;
        for index in selected {
            let record = &self.items[index];
            let offset = self.offsets[index];
            session.item(index, record, |out| {
                if record.is_dir {
                    return Ok(());
                }
                stream.seek(SeekFrom::Start(offset))?;
                let copied = io::copy(&mut (&mut *stream).take(record.size), out)?;
                if copied < record.size {
                    return Err(EngineFailure::new(
                        EngineCode::HANDLE_EOF,
                        format!("entry data ends after {copied} of {} bytes", record.size),
                    ));
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// TAR writer. Produces GNU-format headers; there is nothing to tune.
#[derive(Default)]
pub(crate) struct TarOut;

impl OutArchive for TarOut {
    fn set_properties(&mut self, properties: &[(String, PropValue)]) -> EngineResult<()> {
        for (name, value) in properties {
            match name.to_ascii_lowercase().as_str() {
                prop_names::LEVEL | prop_names::THREADS => {
                    log::debug!("tar writer ignores {name}={value}");
                }
                prop_names::METHOD if value.as_str().is_some_and(|m| m.eq_ignore_ascii_case("copy")) => {}
                other => {
                    return Err(EngineFailure::new(
                        EngineCode::E_INVALIDARG,
                        format!("unsupported tar property '{other}'={value}"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn update_items(
        &mut self,
        out: Box<dyn OutStream>,
        count: usize,
        callback: &mut dyn UpdateCallback,
    ) -> EngineResult<()> {
        let items = update::collect(callback, count)?;
        callback.set_total(update::total_size(&items))?;
        let (defined, password) = callback.crypto_get_text_password2()?;
        if defined && !password.is_empty() {
            return Err(EngineFailure::new(
                EngineCode::NOT_SUPPORTED,
                "tar archives cannot be encrypted",
            ));
        }

        let mut builder = Builder::new(out);
        let mut completed = 0u64;
        for item in &items {
            log::trace!("adding {}", item.path);
            let mut header = Header::new_gnu();
            header.set_mode(item.unix_mode());
            header.set_mtime(item.modified.map_or(0, |t| t.as_unix_mtime()));
            if item.is_dir {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                builder.append_data(&mut header, format!("{}/", item.path), io::empty())?;
                continue;
            }
            if let Some((entry_type, target)) = link_entry(item) {
                header.set_entry_type(entry_type);
                header.set_size(0);
                builder
                    .append_link(&mut header, &item.path, target)
                    .map_err(|e| EngineFailure::from(e).with_context(&item.path))?;
                continue;
            }
            header.set_entry_type(EntryType::Regular);
            let mut source = update::open_item(callback, item)?;
            let size = source.size()?;
            header.set_size(size);
            let mut reader = ProgressReader::new(&mut source, callback, completed);
            let appended = builder.append_data(&mut header, &item.path, &mut reader);
            completed = reader.completed;
            if let Some(failure) = reader.failure.take() {
                return Err(failure);
            }
            appended.map_err(|e| EngineFailure::from(e).with_context(&item.path))?;
        }
        let mut out = builder.into_inner()?;
        out.flush()?;
        drop(out);
        log::debug!("wrote tar archive with {} items", items.len());
        update::report_success(callback, &items)
    }
}

fn link_entry(item: &PendingItem) -> Option<(EntryType, &str)> {
    match (&item.symlink, &item.hard_link) {
        (Some(target), _) => Some((EntryType::Symlink, target)),
        (None, Some(target)) => Some((EntryType::Link, target)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OperationResult;
    use crate::engine::extract::testing::{Collect, NoPassword};
    use crate::engine::update::testing::ScriptedUpdate;
    use crate::stream::{MemoryInStream, MemoryOutStream, SharedBuffer};

    fn write(items: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
        let mut cb = ScriptedUpdate::new(items);
        let buffer = SharedBuffer::new();
        TarOut
            .update_items(
                Box::new(MemoryOutStream::with_buffer(buffer.clone())),
                items.len(),
                &mut cb,
            )
            .unwrap();
        assert_eq!(cb.results.len(), items.len());
        buffer.to_vec()
    }

    fn open(bytes: Vec<u8>) -> TarIn {
        let mut archive = TarIn::default();
        archive
            .open(Box::new(MemoryInStream::new(bytes)), &mut NoPassword)
            .unwrap();
        archive
    }

    #[test]
    fn round_trip_with_directories() {
        let bytes = write(&[
            ("src", None),
            ("src/main.rs", Some(b"fn main() {}")),
            ("src/empty.rs", Some(b"")),
        ]);
        assert_eq!(&bytes[257..262], b"ustar");

        let mut archive = open(bytes);
        assert_eq!(archive.item_count(), 3);
        assert_eq!(archive.item_property(0, PropId::Path).unwrap().as_str(), Some("src"));
        assert_eq!(archive.item_property(0, PropId::IsDir).unwrap().as_bool(), Some(true));
        assert_eq!(archive.item_property(1, PropId::Size).unwrap().as_u64(), Some(12));
        assert_eq!(
            archive.item_property(1, PropId::MTime).unwrap().as_time(),
            Timestamp::from_unix_secs(1_700_000_000)
        );
        let attrib = archive.item_property(1, PropId::Attrib).unwrap().as_u32().unwrap();
        assert_eq!(attributes::unix_mode(attrib).map(|m| m & 0o777), Some(0o644));

        let mut cb = Collect::default();
        archive.extract(Some(&[1, 2]), false, &mut cb).unwrap();
        assert_eq!(cb.results, vec![(1, OperationResult::Ok), (2, OperationResult::Ok)]);
        assert_eq!(cb.output(1).unwrap(), b"fn main() {}");
        assert_eq!(cb.output(2).unwrap(), b"");
    }

    #[test]
    fn long_paths_survive() {
        let long = format!("{}/file.txt", "nested".repeat(30));
        let bytes = write(&[(long.as_str(), Some(b"x"))]);
        let archive = open(bytes);
        assert_eq!(archive.item_property(0, PropId::Path).unwrap().as_str(), Some(long.as_str()));
    }

    #[test]
    fn truncated_data_is_reported() {
        let mut bytes = write(&[("big.bin", Some(&[7u8; 2000][..]))]);
        bytes.truncate(512 + 1000);
        let mut archive = open(bytes);
        let mut cb = Collect::default();
        archive.extract(None, false, &mut cb).unwrap();
        assert_eq!(cb.results, vec![(0, OperationResult::UnexpectedEnd)]);
    }

    #[test]
    fn links_are_written_and_skipped_on_read() {
        let mut cb = ScriptedUpdate::new(&[("bin/app-1.0", Some(b"ELF"))])
            .with_link("bin/app", PropId::SymLink, "app-1.0")
            .with_link("bin/app-copy", PropId::HardLink, "bin/app-1.0");
        let buffer = SharedBuffer::new();
        TarOut
            .update_items(Box::new(MemoryOutStream::with_buffer(buffer.clone())), 3, &mut cb)
            .unwrap();
        assert_eq!(cb.opened, vec![0]);
        let bytes = buffer.to_vec();

        let mut raw = Archive::new(bytes.as_slice());
        let links: Vec<_> = raw
            .entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let target = entry.link_name().unwrap().map(|t| t.display().to_string());
                (entry.header().entry_type(), target)
            })
            .collect();
        assert_eq!(links[1], (EntryType::Symlink, Some("app-1.0".to_string())));
        assert_eq!(links[2], (EntryType::Link, Some("bin/app-1.0".to_string())));

        let archive = open(bytes);
        assert_eq!(archive.item_count(), 1);
    }

    #[test]
    fn encryption_is_rejected() {
        let mut cb = ScriptedUpdate::new(&[("a", Some(b"1"))]);
        cb.password = Some(crate::Password::new("pw"));
        let err = TarOut
            .update_items(Box::new(MemoryOutStream::new()), 1, &mut cb)
            .unwrap_err();
        assert_eq!(err.code, EngineCode::NOT_SUPPORTED);
    }

    #[test]
    fn entry_size_follows_the_source() {
        let items: &[(&str, Option<&[u8]>)] = &[("grew.log", Some(b"late data"))];
        let mut cb = ScriptedUpdate::new(items).with_declared_size(0, 0);
        let buffer = SharedBuffer::new();
        TarOut
            .update_items(Box::new(MemoryOutStream::with_buffer(buffer.clone())), 1, &mut cb)
            .unwrap();

        let mut archive = open(buffer.to_vec());
        assert_eq!(archive.item_property(0, PropId::Size).unwrap().as_u64(), Some(9));
        let mut cb = Collect::default();
        archive.extract(None, false, &mut cb).unwrap();
        assert_eq!(cb.output(0).unwrap(), b"late data");
    }
}
