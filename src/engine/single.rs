//! Single-stream formats: gzip, bzip2, xz and LZMA-alone.
//!
//! The engine presents each stream as an archive holding exactly one item.
//! The encoders and decoders here also back [`Compressor`](crate::Compressor).

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::extract::ExtractSession;
use super::record::{ArchiveRecord, ItemRecord, item_at, resolve_indices};
use super::update;
use super::{
    EngineCode, EngineFailure, EngineResult, ExtractCallback, InArchive, OpenCallback,
    OutArchive, UpdateCallback, prop_names,
};
use crate::Timestamp;
use crate::format::ArchiveFormat;
use crate::property::{PropId, PropValue};
use crate::stream::{InStream, OutStream};

/// Item name used when neither the stream nor the archive file name gives one.
const DEFAULT_ITEM_NAME: &str = "data";

/// A compiled-in single-stream codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Codec {
    #[cfg(feature = "deflate")]
    Gzip,
    #[cfg(feature = "bzip2")]
    Bzip2,
    #[cfg(feature = "lzma")]
    Xz,
    #[cfg(feature = "lzma")]
    Lzma,
}

/// Encoder tuning shared by the engine writer and the compressor.
#[derive(Debug, Clone, Default)]
pub(crate) struct EncodeSettings {
    pub level: u32,
    pub threads: u32,
    pub dictionary: Option<u32>,
    /// File name stored in the gzip header.
    pub name: Option<String>,
    /// Modification time stored in the gzip header.
    pub modified: Option<Timestamp>,
    /// Exact input size, written into the LZMA-alone header when known.
    pub size: Option<u64>,
}

impl Codec {
    /// Codecs enabled by the crate features.
    pub fn available() -> &'static [Codec] {
        &[
            #[cfg(feature = "deflate")]
            Codec::Gzip,
            #[cfg(feature = "bzip2")]
            Codec::Bzip2,
            #[cfg(feature = "lzma")]
            Codec::Xz,
            #[cfg(feature = "lzma")]
            Codec::Lzma,
        ]
    }

    pub fn from_format(format: ArchiveFormat) -> Option<Codec> {
        Self::available().iter().copied().find(|c| c.format() == format)
    }

    pub fn format(self) -> ArchiveFormat {
        match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => ArchiveFormat::GZip,
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => ArchiveFormat::BZip2,
            #[cfg(feature = "lzma")]
            Codec::Xz => ArchiveFormat::Xz,
            #[cfg(feature = "lzma")]
            Codec::Lzma => ArchiveFormat::Lzma,
        }
    }

    /// Method name reported for the item and accepted by the `m` property.
    fn method(self) -> &'static str {
        match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => "Deflate",
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => "BZip2",
            #[cfg(feature = "lzma")]
            Codec::Xz => "LZMA2",
            #[cfg(feature = "lzma")]
            Codec::Lzma => "LZMA",
        }
    }

    pub fn in_factory(self) -> fn() -> Box<dyn InArchive> {
        match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => || Box::new(SingleIn::new(Codec::Gzip)),
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => || Box::new(SingleIn::new(Codec::Bzip2)),
            #[cfg(feature = "lzma")]
            Codec::Xz => || Box::new(SingleIn::new(Codec::Xz)),
            #[cfg(feature = "lzma")]
            Codec::Lzma => || Box::new(SingleIn::new(Codec::Lzma)),
        }
    }

    pub fn out_factory(self) -> fn() -> Box<dyn OutArchive> {
        match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => || Box::new(SingleOut::new(Codec::Gzip)),
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => || Box::new(SingleOut::new(Codec::Bzip2)),
            #[cfg(feature = "lzma")]
            Codec::Xz => || Box::new(SingleOut::new(Codec::Xz)),
            #[cfg(feature = "lzma")]
            Codec::Lzma => || Box::new(SingleOut::new(Codec::Lzma)),
        }
    }

    /// Checks the stream signature.
    fn matches(self, header: &[u8]) -> bool {
        match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => header.starts_with(&[0x1F, 0x8B]),
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => header.starts_with(b"BZh"),
            #[cfg(feature = "lzma")]
            Codec::Xz => header.starts_with(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]),
            // No magic: a valid properties byte and a full 13-byte header.
            #[cfg(feature = "lzma")]
            Codec::Lzma => header.len() >= 13 && header[0] < 9 * 5 * 5,
        }
    }

    /// Wraps `input` in a decoder.
    pub fn decoder<'a>(self, input: impl Read + 'a) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(input)),
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(input)),
            #[cfg(feature = "lzma")]
            Codec::Xz => Box::new(lzma_rust2::XzReader::new(input, true)),
            #[cfg(feature = "lzma")]
            Codec::Lzma => Box::new(lzma_rust2::LzmaReader::new_mem_limit(input, u32::MAX, None)?),
        })
    }

    /// Wraps `out` in an encoder.
    pub fn encoder<W: Write>(self, out: W, settings: &EncodeSettings) -> io::Result<Encoder<W>> {
        let level = settings.level.min(9);
        Ok(match self {
            #[cfg(feature = "deflate")]
            Codec::Gzip => {
                let mut builder = flate2::GzBuilder::new();
                if let Some(name) = &settings.name {
                    builder = builder.filename(name.as_bytes());
                }
                if let Some(secs) = settings
                    .modified
                    .and_then(|t| u32::try_from(t.as_unix_secs()).ok())
                {
                    builder = builder.mtime(secs);
                }
                Encoder::Gzip(builder.write(out, flate2::Compression::new(level)))
            }
            #[cfg(feature = "bzip2")]
            Codec::Bzip2 => Encoder::Bzip2(bzip2::write::BzEncoder::new(
                out,
                bzip2::Compression::new(level.max(1)),
            )),
            #[cfg(feature = "lzma")]
            Codec::Xz => {
                let mut options = lzma_rust2::XzOptions::with_preset(level);
                if let Some(dictionary) = settings.dictionary {
                    options.lzma_options.dict_size = dictionary.max(lzma_rust2::DICT_SIZE_MIN);
                }
                if settings.threads > 1 {
                    let block = u64::from(options.lzma_options.dict_size) * 3;
                    options.set_block_size(std::num::NonZeroU64::new(block));
                    Encoder::XzMt(lzma_rust2::XzWriterMt::new(out, options, settings.threads)?)
                } else {
                    Encoder::Xz {
                        check: options.check_type,
                        writer: lzma_rust2::XzWriter::new(out, options)?,
                        written: false,
                    }
                }
            }
            #[cfg(feature = "lzma")]
            Codec::Lzma => {
                let mut options = lzma_rust2::LzmaOptions::with_preset(level);
                if let Some(dictionary) = settings.dictionary {
                    options.dict_size = dictionary.max(lzma_rust2::DICT_SIZE_MIN);
                }
                Encoder::Lzma(lzma_rust2::LzmaWriter::new_use_header(out, &options, settings.size)?)
            }
        })
    }
}

/// A running single-stream encoder; [`Encoder::finish`] must be called to
/// write the trailer.
pub(crate) enum Encoder<W: Write> {
    #[cfg(feature = "deflate")]
    Gzip(flate2::write::GzEncoder<W>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::write::BzEncoder<W>),
    #[cfg(feature = "lzma")]
    Xz {
        writer: lzma_rust2::XzWriter<W>,
        check: lzma_rust2::CheckType,
        written: bool,
    },
    #[cfg(feature = "lzma")]
    XzMt(lzma_rust2::XzWriterMt<W>),
    #[cfg(feature = "lzma")]
    Lzma(lzma_rust2::LzmaWriter<W>),
}

impl<W: Write> Encoder<W> {
    pub fn finish(self) -> io::Result<W> {
        match self {
            #[cfg(feature = "deflate")]
            Encoder::Gzip(e) => e.finish(),
            #[cfg(feature = "bzip2")]
            Encoder::Bzip2(e) => e.finish(),
            #[cfg(feature = "lzma")]
            Encoder::Xz {
                writer,
                check,
                written,
            } => {
                if written {
                    writer.finish()
                } else {
                    let mut out = writer.into_inner();
                    write_empty_xz(&mut out, check)?;
                    Ok(out)
                }
            }
            #[cfg(feature = "lzma")]
            Encoder::XzMt(e) => e.finish(),
            #[cfg(feature = "lzma")]
            Encoder::Lzma(e) => e.finish(),
        }
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            #[cfg(feature = "deflate")]
            Encoder::Gzip(e) => e,
            #[cfg(feature = "bzip2")]
            Encoder::Bzip2(e) => e,
            #[cfg(feature = "lzma")]
            Encoder::Xz { writer, .. } => writer,
            #[cfg(feature = "lzma")]
            Encoder::XzMt(e) => e,
            #[cfg(feature = "lzma")]
            Encoder::Lzma(e) => e,
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner().write(buf)?;
        match self {
            #[cfg(feature = "lzma")]
            Encoder::Xz { written, .. } => *written |= n > 0,
            _ => {}
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

/// Writes an xz stream without blocks, which `XzWriter` cannot finish on
/// its own.
#[cfg(feature = "lzma")]
fn write_empty_xz<W: Write>(out: &mut W, check: lzma_rust2::CheckType) -> io::Result<()> {
    let flags = [0u8, check as u8];
    let mut stream = Vec::with_capacity(32);
    stream.extend_from_slice(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]);
    stream.extend_from_slice(&flags);
    stream.extend_from_slice(&crc32fast::hash(&flags).to_le_bytes());
    // Index: indicator, zero records, padding.
    let index = [0u8; 4];
    stream.extend_from_slice(&index);
    stream.extend_from_slice(&crc32fast::hash(&index).to_le_bytes());
    // Footer: backward size counts the 8 index bytes in 4-byte units, minus one.
    let mut footer = [0u8; 6];
    footer[..4].copy_from_slice(&1u32.to_le_bytes());
    footer[4..].copy_from_slice(&flags);
    stream.extend_from_slice(&crc32fast::hash(&footer).to_le_bytes());
    stream.extend_from_slice(&footer);
    stream.extend_from_slice(b"YZ");
    out.write_all(&stream)
}

/// Classifies a decoder error.
pub(crate) fn decode_failure(error: io::Error) -> EngineFailure {
    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    let code = if error.kind() == io::ErrorKind::UnexpectedEof {
        EngineCode::HANDLE_EOF
    } else if lower.contains("crc") || lower.contains("checksum") {
        EngineCode::CRC_ERROR
    } else if matches!(
        error.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::Other
    ) {
        EngineCode::INVALID_DATA
    } else {
        return error.into();
    };
    EngineFailure::new(code, message)
}

/// Strips the last extension of an archive file name: `notes.txt.gz` gives
/// `notes.txt`, `bundle.tgz` gives `bundle.tar`.
fn item_name_from_archive(archive_name: &str) -> Option<String> {
    let path = Path::new(archive_name);
    let stem = path.file_stem()?.to_str()?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let name = match extension.as_deref() {
        Some("tgz" | "tbz" | "tbz2" | "txz" | "tlz") => format!("{stem}.tar"),
        _ => stem.to_string(),
    };
    (!name.is_empty()).then_some(name)
}

/// Reader presenting a compressed stream as a one-item archive.
pub(crate) struct SingleIn {
    codec: Codec,
    stream: Option<Box<dyn InStream>>,
    items: Vec<ItemRecord>,
    info: ArchiveRecord,
}

impl SingleIn {
    fn new(codec: Codec) -> Self {
        Self {
            codec,
            stream: None,
            items: Vec::new(),
            info: ArchiveRecord::default(),
        }
    }

    /// Uncompressed size recorded in the stream, when the format carries one.
    fn stored_size(&self, stream: &mut dyn InStream, header: &[u8]) -> io::Result<u64> {
        match self.codec {
            #[cfg(feature = "deflate")]
            Codec::Gzip => {
                // ISIZE: the input size modulo 2^32.
                let len = stream.size()?;
                if len < 18 {
                    return Ok(0);
                }
                let mut trailer = [0u8; 4];
                stream.seek(SeekFrom::End(-4))?;
                stream.read_exact(&mut trailer)?;
                Ok(u64::from(u32::from_le_bytes(trailer)))
            }
            #[cfg(feature = "lzma")]
            Codec::Lzma => {
                let mut size = [0u8; 8];
                size.copy_from_slice(&header[5..13]);
                Ok(match u64::from_le_bytes(size) {
                    u64::MAX => 0,
                    n => n,
                })
            }
            #[allow(unreachable_patterns)]
            _ => {
                let _ = (stream, header);
                Ok(0)
            }
        }
    }

    /// Name and modification time stored in the stream header.
    fn header_metadata(&self, stream: &mut dyn InStream) -> (Option<String>, Option<Timestamp>) {
        match self.codec {
            #[cfg(feature = "deflate")]
            Codec::Gzip => {
                let decoder = flate2::read::GzDecoder::new(stream);
                match decoder.header() {
                    Some(header) => (
                        header
                            .filename()
                            .map(|n| String::from_utf8_lossy(n).into_owned())
                            .filter(|n| !n.is_empty()),
                        (header.mtime() != 0)
                            .then(|| Timestamp::from_unix_secs(i64::from(header.mtime())))
                            .flatten(),
                    ),
                    None => (None, None),
                }
            }
            #[allow(unreachable_patterns)]
            _ => {
                let _ = stream;
                (None, None)
            }
        }
    }
}

impl InArchive for SingleIn {
    fn open(
        &mut self,
        mut stream: Box<dyn InStream>,
        callback: &mut dyn OpenCallback,
    ) -> EngineResult<()> {
        let physical_size = stream.size()?;
        stream.seek(SeekFrom::Start(0))?;
        let mut header = Vec::with_capacity(13);
        (&mut stream).take(13).read_to_end(&mut header)?;
        if !self.codec.matches(&header) {
            return Err(EngineFailure::new(
                EngineCode::NOT_ARCHIVE,
                format!("not a {} stream", self.codec.format()),
            ));
        }
        let size = self.stored_size(&mut *stream, &header)?;
        stream.seek(SeekFrom::Start(0))?;
        let (stored_name, modified) = self.header_metadata(&mut *stream);
        stream.seek(SeekFrom::Start(0))?;

        let path = stored_name
            .map(|n| n.replace('\\', "/"))
            .or_else(|| callback.archive_name().as_deref().and_then(item_name_from_archive))
            .unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string());
        self.items = vec![ItemRecord {
            path,
            size,
            packed_size: physical_size,
            modified,
            method: Some(self.codec.method().to_string()),
            ..ItemRecord::default()
        }];
        self.info = ArchiveRecord {
            physical_size,
            method: Some(self.codec.method().to_string()),
            ..ArchiveRecord::default()
        };
        log::debug!("opened {} stream ({physical_size} bytes)", self.codec.format());
        self.stream = Some(stream);
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
        let codec = self.codec;
        let mut session = ExtractSession::begin(callback, &self.items, &selected, test)?;
        for index in selected {
            session.item(index, &self.items[index], |out| {
                stream.seek(SeekFrom::Start(0))?;
                let mut decoder = codec.decoder(&mut *stream).map_err(decode_failure)?;
                io::copy(&mut decoder, out).map_err(decode_failure)?;
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Writer producing one compressed stream from a single file item.
pub(crate) struct SingleOut {
    codec: Codec,
    settings: EncodeSettings,
}

impl SingleOut {
    fn new(codec: Codec) -> Self {
        Self {
            codec,
            settings: EncodeSettings {
                level: 5,
                threads: 1,
                ..EncodeSettings::default()
            },
        }
    }
}

impl OutArchive for SingleOut {
    fn set_properties(&mut self, properties: &[(String, PropValue)]) -> EngineResult<()> {
        let invalid = |name: &str, value: &PropValue| {
            EngineFailure::new(
                EngineCode::E_INVALIDARG,
                format!("invalid value {value} for property '{name}'"),
            )
        };
        for (name, value) in properties {
            match name.to_ascii_lowercase().as_str() {
                prop_names::LEVEL => {
                    self.settings.level = value
                        .as_u32()
                        .filter(|l| *l <= 9)
                        .ok_or_else(|| invalid(name, value))?;
                }
                prop_names::THREADS => {
                    self.settings.threads = value.as_u32().ok_or_else(|| invalid(name, value))?;
                }
                prop_names::DICTIONARY => {
                    self.settings.dictionary = Some(
                        value
                            .as_u64()
                            .and_then(|d| u32::try_from(d).ok())
                            .ok_or_else(|| invalid(name, value))?,
                    );
                }
                prop_names::METHOD => {
                    if !value
                        .as_str()
                        .is_some_and(|m| m.eq_ignore_ascii_case(self.codec.method()))
                    {
                        return Err(EngineFailure::new(
                            EngineCode::NOT_SUPPORTED,
                            format!("{} streams only use {}", self.codec.format(), self.codec.method()),
                        ));
                    }
                }
                other => {
                    return Err(EngineFailure::new(
                        EngineCode::E_INVALIDARG,
                        format!("unknown {} property '{other}'", self.codec.format()),
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
        let item = match items.as_slice() {
            [item] if !item.is_dir => item,
            _ => {
                return Err(EngineFailure::new(
                    EngineCode::E_INVALIDARG,
                    format!("a {} stream holds exactly one file", self.codec.format()),
                ));
            }
        };
        item.reject_link(self.codec.format())?;
        let (defined, password) = callback.crypto_get_text_password2()?;
        if defined && !password.is_empty() {
            return Err(EngineFailure::new(
                EngineCode::NOT_SUPPORTED,
                format!("{} streams cannot be encrypted", self.codec.format()),
            ));
        }
        callback.set_total(item.size)?;

        let mut source = update::open_item(callback, item)?;
        let settings = EncodeSettings {
            name: item.path.rsplit('/').next().map(str::to_string),
            modified: item.modified,
            size: Some(source.size()?),
            ..self.settings.clone()
        };
        let mut encoder = self.codec.encoder(out, &settings)?;
        update::copy_with_progress(callback, &mut source, &mut encoder, 0)
            .map_err(|f| f.with_context(&item.path))?;
        let mut out = encoder.finish()?;
        out.flush()?;
        drop(out);
        log::debug!("wrote {} stream for {}", self.codec.format(), item.path);
        update::report_success(callback, &items)
    }
}
