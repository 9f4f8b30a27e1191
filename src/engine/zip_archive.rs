//! ZIP handler backed by the `zip` crate.

use std::io::{self, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::extract::ExtractSession;
use super::record::{ArchiveRecord, ItemRecord, item_at, normalize_name, resolve_indices};
use super::update::{self, PendingItem};
use super::{
    EngineCode, EngineFailure, EngineResult, ExtractCallback, InArchive, OpenCallback,
    OutArchive, UpdateCallback, prop_names,
};
use crate::property::{PropId, PropValue, attributes};
use crate::stream::{InStream, OutStream};
use crate::timestamp::CivilTime;
use crate::{Password, Timestamp};

pub(crate) fn zip_failure(error: ZipError) -> EngineFailure {
    match error {
        ZipError::Io(e) => e.into(),
        ZipError::InvalidArchive(message) => {
            EngineFailure::new(EngineCode::NOT_ARCHIVE, format!("invalid zip archive: {message}"))
        }
        ZipError::UnsupportedArchive(ZipError::PASSWORD_REQUIRED) => {
            EngineFailure::new(EngineCode::INVALID_PASSWORD, ZipError::PASSWORD_REQUIRED)
        }
        ZipError::UnsupportedArchive(message) => EngineFailure::new(
            EngineCode::NOT_SUPPORTED,
            format!("unsupported zip feature: {message}"),
        ),
        ZipError::FileNotFound => {
            EngineFailure::new(EngineCode::FILE_NOT_FOUND, "file not found in zip archive")
        }
        ZipError::InvalidPassword => {
            EngineFailure::new(EngineCode::INVALID_PASSWORD, "provided password is incorrect")
        }
        other => EngineFailure::new(EngineCode::E_FAIL, other.to_string()),
    }
}

/// Decodes an MS-DOS date-time, read as UTC.
fn from_dos(time: DateTime) -> Option<Timestamp> {
    Timestamp::from_civil(CivilTime {
        year: i32::from(time.year()),
        month: time.month(),
        day: time.day(),
        hour: time.hour(),
        minute: time.minute(),
        second: time.second(),
    })
}

/// Encodes a timestamp as an MS-DOS date-time; `None` outside 1980..=2107.
fn to_dos(time: Timestamp) -> Option<DateTime> {
    let civil = time.to_civil();
    let year = u16::try_from(civil.year).ok()?;
    DateTime::from_date_and_time(year, civil.month, civil.day, civil.hour, civil.minute, civil.second)
        .ok()
}

/// ZIP reader.
#[derive(Default)]
pub(crate) struct ZipIn {
    archive: Option<ZipArchive<Box<dyn InStream>>>,
    items: Vec<ItemRecord>,
    info: ArchiveRecord,
}

impl InArchive for ZipIn {
    fn open(
        &mut self,
        mut stream: Box<dyn InStream>,
        _callback: &mut dyn OpenCallback,
    ) -> EngineResult<()> {
        let physical_size = stream.size()?;
        let mut archive = ZipArchive::new(stream).map_err(zip_failure)?;
        let mut items = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(zip_failure)?;
            let is_dir = file.is_dir();
            let base = if is_dir {
                attributes::DIRECTORY
            } else {
                attributes::ARCHIVE
            };
            let encrypted = file.encrypted();
            items.push(ItemRecord {
                path: normalize_name(file.name()),
                is_dir,
                size: file.size(),
                packed_size: file.compressed_size(),
                crc: (!is_dir && !(encrypted && file.crc32() == 0)).then(|| file.crc32()),
                modified: file.last_modified().and_then(from_dos),
                attributes: Some(match file.unix_mode() {
                    Some(mode) => attributes::with_unix_mode(base, mode),
                    None => base,
                }),
                encrypted,
                comment: (!file.comment().is_empty()).then(|| file.comment().to_string()),
                method: Some(file.compression().to_string()),
                ..ItemRecord::default()
            });
        }
        let comment = String::from_utf8_lossy(archive.comment()).into_owned();
        self.info = ArchiveRecord {
            physical_size,
            solid: false,
            headers_encrypted: false,
            method: None,
            comment: (!comment.is_empty()).then_some(comment),
        };
        log::debug!("opened zip archive: {} items", items.len());
        self.items = items;
        self.archive = Some(archive);
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
        let Some(archive) = self.archive.as_mut() else {
            return Err(EngineFailure::new(EngineCode::E_UNEXPECTED, "archive is not open"));
        };
        let selected = resolve_indices(indices, self.items.len())?;
        let mut session = ExtractSession::begin(callback, &self.items, &selected, test)?;
        for index in selected {
            let record = &self.items[index];
            if record.is_dir {
                session.item(index, record, |_| Ok(()))?;
                continue;
            }
            let password = if record.encrypted {
                session.password()?
            } else {
                None
            };
            session.item(index, record, |out| {
                let opened = match &password {
                    Some(password) => archive.by_index_decrypt(index, password.as_str().as_bytes()),
                    None => archive.by_index(index),
                };
                let mut file = opened.map_err(|e| match zip_failure(e) {
                    f if f.code == EngineCode::NOT_ARCHIVE => {
                        EngineFailure::new(EngineCode::INVALID_DATA, f.message)
                    }
                    f => f,
                })?;
                io::copy(&mut file, out)?;
                Ok(())
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Copy,
    Deflate,
    BZip2,
}

/// ZIP writer.
pub(crate) struct ZipOut {
    level: u32,
    method: Method,
}

impl Default for ZipOut {
    fn default() -> Self {
        Self {
            level: 5,
            method: Method::Deflate,
        }
    }
}

impl ZipOut {
    fn file_options(&self, item: &PendingItem) -> SimpleFileOptions {
        let (method, level) = match self.method {
            _ if self.level == 0 => (CompressionMethod::Stored, None),
            Method::Copy => (CompressionMethod::Stored, None),
            Method::Deflate => (CompressionMethod::Deflated, Some(i64::from(self.level))),
            Method::BZip2 => (CompressionMethod::Bzip2, Some(i64::from(self.level))),
        };
        let mut options = SimpleFileOptions::default()
            .compression_method(method)
            .compression_level(level)
            .unix_permissions(item.unix_mode())
            .large_file(item.size > u64::from(u32::MAX));
        if let Some(time) = item.modified.and_then(to_dos) {
            options = options.last_modified_time(time);
        }
        options
    }
}

#[cfg(feature = "aes")]
fn encrypted<'p>(
    options: SimpleFileOptions,
    password: &'p Password,
) -> EngineResult<zip::write::FileOptions<'p, ()>> {
    Ok(options.with_aes_encryption(zip::AesMode::Aes256, password.as_str()))
}

#[cfg(not(feature = "aes"))]
fn encrypted<'p>(
    _options: SimpleFileOptions,
    _password: &'p Password,
) -> EngineResult<zip::write::FileOptions<'p, ()>> {
    Err(EngineFailure::new(
        EngineCode::NOT_SUPPORTED,
        "encryption support is not compiled in (feature `aes`)",
    ))
}

impl OutArchive for ZipOut {
    fn set_properties(&mut self, properties: &[(String, PropValue)]) -> EngineResult<()> {
        for (name, value) in properties {
            match name.to_ascii_lowercase().as_str() {
                prop_names::LEVEL => {
                    self.level = value.as_u32().filter(|l| *l <= 9).ok_or_else(|| {
                        EngineFailure::new(
                            EngineCode::E_INVALIDARG,
                            format!("invalid compression level {value}"),
                        )
                    })?;
                }
                prop_names::METHOD => {
                    self.method = match value.as_str().map(str::to_ascii_lowercase).as_deref() {
                        Some("deflate") => Method::Deflate,
                        Some("bzip2") => Method::BZip2,
                        Some("copy") => Method::Copy,
                        _ => {
                            return Err(EngineFailure::new(
                                EngineCode::NOT_SUPPORTED,
                                format!("unsupported method for zip: {value}"),
                            ));
                        }
                    };
                }
                prop_names::THREADS | prop_names::DICTIONARY => {
                    log::debug!("zip writer ignores {name}={value}");
                }
                other => {
                    return Err(EngineFailure::new(
                        EngineCode::E_INVALIDARG,
                        format!("unknown zip property '{other}'"),
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
        let password = (defined && !password.is_empty()).then_some(password);

        let mut writer = ZipWriter::new(out);
        let mut completed = 0u64;
        for item in &items {
            log::trace!("compressing {}", item.path);
            if item.hard_link.is_some() {
                return Err(EngineFailure::new(
                    EngineCode::NOT_SUPPORTED,
                    format!("zip cannot store hard link '{}'", item.path),
                ));
            }
            let options = self.file_options(item);
            if let Some(target) = &item.symlink {
                let options = options
                    .compression_method(CompressionMethod::Stored)
                    .compression_level(None);
                writer
                    .add_symlink(item.path.as_str(), target.as_str(), options)
                    .map_err(zip_failure)?;
                continue;
            }
            let options = match &password {
                Some(password) => encrypted(options, password)?,
                None => options,
            };
            if item.is_dir {
                writer
                    .add_directory(item.path.as_str(), options)
                    .map_err(zip_failure)?;
                continue;
            }
            writer
                .start_file(item.path.as_str(), options)
                .map_err(zip_failure)?;
            if item.size > 0 {
                let mut source = update::open_item(callback, item)?;
                completed += update::copy_with_progress(callback, &mut source, &mut writer, completed)
                    .map_err(|f| f.with_context(&item.path))?;
            }
        }
        let mut out = writer.finish().map_err(zip_failure)?;
        out.flush()?;
        drop(out);
        log::debug!("wrote zip archive with {} items", items.len());
        update::report_success(callback, &items)
    }
}
