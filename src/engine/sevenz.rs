//! 7z handler backed by `sevenz-rust`.

use std::cell::{Cell, RefCell};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::rc::Rc;

use sevenz_rust::lzma::LZMA2Options;
use sevenz_rust::nt_time::FileTime;
use sevenz_rust::{
    Archive, BlockDecoder, MethodOptions, SeqReader, SevenZArchiveEntry, SevenZMethod,
    SevenZMethodConfiguration, SevenZWriter, SourceReader,
};

use super::extract::ExtractSession;
use super::record::{ArchiveRecord, ItemRecord, item_at, normalize_name, resolve_indices};
use super::update::{self, PendingItem};
use super::{
    EngineCode, EngineFailure, EngineResult, ExtractCallback, InArchive, OpenCallback,
    OperationResult, OutArchive, UpdateCallback, prop_names,
};
use crate::property::{PropId, PropValue, attributes};
use crate::stream::{InStream, OutStream};
use crate::{Error, Password, Timestamp};

/// Maps a `sevenz-rust` error to an engine failure.
pub(crate) fn seven_failure(error: sevenz_rust::Error) -> EngineFailure {
    use sevenz_rust::Error as E;
    let message = error.to_string();
    let code = match &error {
        E::BadSignature(_) => EngineCode::NOT_ARCHIVE,
        E::ChecksumVerificationFailed | E::NextHeaderCrcMismatch => EngineCode::CRC_ERROR,
        E::PasswordRequired | E::MaybeBadPassword(_) => EngineCode::INVALID_PASSWORD,
        E::UnsupportedVersion { .. }
        | E::UnsupportedCompressionMethod(_)
        | E::Unsupported(_)
        | E::ExternalUnsupported => EngineCode::NOT_SUPPORTED,
        E::MaxMemLimited { .. } => EngineCode::E_OUTOFMEMORY,
        E::Io(e, _) | E::FileOpen(e, _) => match e.kind() {
            io::ErrorKind::UnexpectedEof => EngineCode::HANDLE_EOF,
            io::ErrorKind::Interrupted => EngineCode::E_ABORT,
            _ => EngineCode::E_FAIL,
        },
        _ => EngineCode::E_FAIL,
    };
    EngineFailure::new(code, message)
}

fn timestamp(present: bool, time: FileTime) -> Option<Timestamp> {
    present.then(|| Timestamp::from_filetime(time.to_raw()))
}

fn method_names(archive: &Archive, folder: usize) -> Vec<&'static str> {
    archive.folders[folder]
        .coders
        .iter()
        .filter_map(|coder| SevenZMethod::by_id(coder.decompression_method_id()))
        .map(|method| method.name())
        .collect()
}

/// Indices of the files stored in `folder`.
fn folder_files(archive: &Archive, folder: usize) -> EngineResult<Range<usize>> {
    let first = archive.stream_map.folder_first_file_index.get(folder).copied();
    let count = archive.folders.get(folder).map(|f| f.num_unpack_sub_streams);
    match (first, count) {
        (Some(first), Some(count))
            if first
                .checked_add(count)
                .is_some_and(|end| end <= archive.files.len()) =>
        {
            Ok(first..first + count)
        }
        _ => Err(EngineFailure::new(
            EngineCode::E_FAIL,
            format!("inconsistent 7z headers: block {folder} lies outside the file list"),
        )),
    }
}

fn folder_encrypted(archive: &Archive, folder: usize) -> bool {
    archive.folders[folder]
        .coders
        .iter()
        .any(|coder| coder.decompression_method_id() == SevenZMethod::ID_AES256SHA256)
}

/// 7z reader.
#[derive(Default)]
pub(crate) struct SevenZipIn {
    stream: Option<Box<dyn InStream>>,
    archive: Option<Archive>,
    items: Vec<ItemRecord>,
    info: ArchiveRecord,
}

impl SevenZipIn {
    fn read_headers(
        stream: &mut Box<dyn InStream>,
        len: u64,
        callback: &mut dyn OpenCallback,
    ) -> EngineResult<(Archive, bool)> {
        match Archive::read(stream, len, &[]) {
            Ok(archive) => return Ok((archive, false)),
            Err(sevenz_rust::Error::PasswordRequired) => {}
            Err(e) => return Err(seven_failure(e)),
        }
        let password = match callback.password()? {
            Some(password) if !password.is_empty() => password,
            _ => return Err(Error::EncryptedHeader.into()),
        };
        stream.rewind()?;
        let archive = Archive::read(stream, len, &password.as_utf16_le()).map_err(|e| {
            log::debug!("reading encrypted 7z headers failed: {e}");
            EngineFailure::new(EngineCode::INVALID_PASSWORD, "cannot decrypt archive headers: wrong password")
        })?;
        Ok((archive, true))
    }

    fn build_records(archive: &Archive) -> Vec<ItemRecord> {
        archive
            .files
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let folder = archive
                    .stream_map
                    .file_folder_index
                    .get(index)
                    .copied()
                    .flatten()
                    .filter(|&f| f < archive.folders.len());
                ItemRecord {
                    path: normalize_name(entry.name()),
                    is_dir: entry.is_directory(),
                    size: entry.size(),
                    packed_size: entry.compressed_size,
                    crc: (entry.has_crc && entry.has_stream).then_some(entry.crc as u32),
                    created: timestamp(entry.has_creation_date, entry.creation_date()),
                    accessed: timestamp(entry.has_access_date, entry.access_date()),
                    modified: timestamp(entry.has_last_modified_date, entry.last_modified_date()),
                    attributes: entry
                        .has_windows_attributes
                        .then_some(entry.windows_attributes()),
                    encrypted: folder.is_some_and(|f| folder_encrypted(archive, f)),
                    comment: None,
                    method: folder.map(|f| method_names(archive, f).join(" ")),
                }
            })
            .collect()
    }
}

impl InArchive for SevenZipIn {
    fn open(
        &mut self,
        mut stream: Box<dyn InStream>,
        callback: &mut dyn OpenCallback,
    ) -> EngineResult<()> {
        let len = stream.size()?;
        stream.rewind()?;
        let (archive, headers_encrypted) = Self::read_headers(&mut stream, len, callback)?;

        let mut methods: Vec<&str> = Vec::new();
        for folder in 0..archive.folders.len() {
            for name in method_names(&archive, folder) {
                if !methods.contains(&name) {
                    methods.push(name);
                }
            }
        }
        self.items = Self::build_records(&archive);
        self.info = ArchiveRecord {
            physical_size: len,
            solid: archive.folders.iter().any(|f| f.num_unpack_sub_streams > 1),
            headers_encrypted,
            method: (!methods.is_empty()).then(|| methods.join(" ")),
            comment: None,
        };
        log::debug!(
            "opened 7z archive: {} items in {} blocks",
            self.items.len(),
            archive.folders.len()
        );
        self.archive = Some(archive);
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
        let (Some(archive), Some(stream)) = (self.archive.as_ref(), self.stream.as_mut()) else {
            return Err(EngineFailure::new(EngineCode::E_UNEXPECTED, "archive is not open"));
        };
        let items = &self.items;
        let selected = resolve_indices(indices, items.len())?;
        let mut wanted = vec![false; items.len()];
        for &i in &selected {
            wanted[i] = true;
        }
        let mut session = ExtractSession::begin(callback, items, &selected, test)?;

        // Items without data first, they need no decoding.
        for &index in &selected {
            let in_folder = archive
                .stream_map
                .file_folder_index
                .get(index)
                .is_some_and(Option::is_some);
            if !in_folder || !archive.files[index].has_stream {
                session.item(index, &items[index], |_| Ok(()))?;
            }
        }

        for folder_index in 0..archive.folders.len() {
            let range = folder_files(archive, folder_index)?;
            let first = range.start;
            if !range.clone().any(|i| wanted[i] && archive.files[i].has_stream) {
                continue;
            }
            let encrypted = folder_encrypted(archive, folder_index);
            let password = if encrypted {
                session.password()?.unwrap_or_default()
            } else {
                Password::default()
            };
            let password = password.as_utf16_le();

            let mut abort: Option<EngineFailure> = None;
            let mut pending: Vec<usize> = range
                .clone()
                .filter(|&i| wanted[i] && archive.files[i].has_stream)
                .collect();
            let mut file_index = first;
            let mut broken: Option<OperationResult> = None;

            let decoder = BlockDecoder::new(folder_index, archive, &password, &mut *stream);
            let outcome = decoder.for_each_entries(&mut |entry, reader| {
                let index = file_index;
                file_index += 1;
                if !wanted[index] || !entry.has_stream {
                    if let Err(e) = io::copy(reader, &mut io::sink()) {
                        log::debug!("skipping 7z item {index} failed: {e}");
                        broken = Some(OperationResult::from_failure(&EngineFailure::from(e), encrypted));
                        return Ok(false);
                    }
                    return Ok(true);
                }
                pending.retain(|&i| i != index);
                let result = match session.item(index, &items[index], |out| {
                    io::copy(reader, out)?;
                    Ok(())
                }) {
                    Ok(result) => result,
                    Err(failure) => {
                        abort = Some(failure);
                        return Ok(false);
                    }
                };
                if !result.is_ok() && io::copy(reader, &mut io::sink()).is_err() {
                    broken = Some(result);
                    return Ok(false);
                }
                Ok(true)
            });

            if let Some(failure) = abort {
                return Err(failure);
            }
            let remaining = match (outcome, broken) {
                (Err(e), _) => {
                    let failure = seven_failure(e);
                    log::debug!("7z block {folder_index} failed: {failure}");
                    Some(OperationResult::from_failure(&failure, encrypted))
                }
                (Ok(_), broken) => broken,
            };
            if let Some(result) = remaining {
                for index in pending {
                    session.fail(index, result)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Lzma,
    Lzma2,
}

/// 7z writer.
pub(crate) struct SevenZipOut {
    level: u32,
    method: Method,
    dictionary: Option<u32>,
    solid: bool,
    encrypt_headers: bool,
}

impl Default for SevenZipOut {
    fn default() -> Self {
        Self {
            level: 5,
            method: Method::Lzma2,
            dictionary: None,
            solid: true,
            encrypt_headers: false,
        }
    }
}

fn invalid(message: String) -> EngineFailure {
    EngineFailure::new(EngineCode::E_INVALIDARG, message)
}

impl SevenZipOut {
    fn content_methods(
        &self,
        password: Option<&Password>,
    ) -> EngineResult<Vec<SevenZMethodConfiguration>> {
        let mut options = LZMA2Options::with_preset(self.level);
        if let Some(dictionary) = self.dictionary {
            options.dict_size = dictionary;
        }
        let method = match self.method {
            Method::Lzma => SevenZMethod::LZMA,
            Method::Lzma2 => SevenZMethod::LZMA2,
        };
        let mut methods = Vec::with_capacity(2);
        if let Some(password) = password {
            methods.push(aes_method(password)?);
        }
        methods.push(SevenZMethodConfiguration::new(method).with_options(MethodOptions::LZMA2(options)));
        Ok(methods)
    }
}

#[cfg(feature = "aes")]
fn aes_method(password: &Password) -> EngineResult<SevenZMethodConfiguration> {
    let key = sevenz_rust::Password::from(password.as_str());
    Ok(sevenz_rust::AesEncoderOptions::new(key).into())
}

#[cfg(not(feature = "aes"))]
fn aes_method(_password: &Password) -> EngineResult<SevenZMethodConfiguration> {
    Err(EngineFailure::new(
        EngineCode::NOT_SUPPORTED,
        "encryption support is not compiled in (feature `aes`)",
    ))
}

/// `S_IFLNK`; the link target is stored as the entry's data.
const SYMLINK_MODE: u32 = 0o120_000;

fn archive_entry(item: &PendingItem) -> SevenZArchiveEntry {
    let mut entry = SevenZArchiveEntry::new();
    entry.name = item.path.clone();
    entry.is_directory = item.is_dir;
    if let Some(time) = item.modified {
        entry.has_last_modified_date = true;
        entry.last_modified_date = FileTime::new(time.as_filetime());
    }
    if let Some(time) = item.created {
        entry.has_creation_date = true;
        entry.creation_date = FileTime::new(time.as_filetime());
    }
    if let Some(time) = item.accessed {
        entry.has_access_date = true;
        entry.access_date = FileTime::new(time.as_filetime());
    }
    if item.symlink.is_some() {
        entry.has_windows_attributes = true;
        entry.windows_attributes =
            attributes::with_unix_mode(attributes::ARCHIVE, SYMLINK_MODE | item.unix_mode());
    } else if let Some(bits) = item.attributes {
        entry.has_windows_attributes = true;
        entry.windows_attributes = bits;
    }
    entry
}

/// State shared by the lazy item readers of one update.
struct Feed<'c> {
    callback: &'c mut dyn UpdateCallback,
    completed: u64,
    failure: Option<EngineFailure>,
}

/// Opens an item's data on first read, so that only one source is open at
/// a time even when all items go into one solid block. A symlink yields its
/// target instead.
struct LazyItemReader<'f, 'c> {
    feed: &'f RefCell<Feed<'c>>,
    item: &'f PendingItem,
    stream: Option<Box<dyn InStream>>,
    head: Vec<u8>,
    head_pos: usize,
    opened: bool,
    done: bool,
}

impl<'f, 'c> LazyItemReader<'f, 'c> {
    fn new(feed: &'f RefCell<Feed<'c>>, item: &'f PendingItem) -> Self {
        Self {
            feed,
            item,
            stream: None,
            head: Vec::new(),
            head_pos: 0,
            opened: false,
            done: false,
        }
    }

    fn open(&mut self, feed: &mut Feed<'c>) -> io::Result<()> {
        self.opened = true;
        if let Some(target) = &self.item.symlink {
            self.head = target.as_bytes().to_vec();
            self.done = true;
            return Ok(());
        }
        log::trace!("compressing {}", self.item.path);
        match update::open_item(&mut *feed.callback, self.item) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(failure) => {
                feed.failure = Some(failure);
                Err(aborted())
            }
        }
    }

    /// Reads ahead until the source yields bytes or ends. Returns false for
    /// an empty source.
    fn has_data(&mut self) -> io::Result<bool> {
        let mut chunk = vec![0u8; 8192];
        let n = self.read(&mut chunk)?;
        chunk.truncate(n);
        chunk.extend_from_slice(&self.head[self.head_pos..]);
        self.head = chunk;
        self.head_pos = 0;
        Ok(n > 0)
    }
}

fn aborted() -> io::Error {
    io::Error::other("update aborted")
}

impl Read for LazyItemReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cell = self.feed;
        let mut guard = cell.borrow_mut();
        let feed = &mut *guard;
        if feed.failure.is_some() {
            return Err(aborted());
        }
        if !self.opened {
            self.open(feed)?;
        }
        if self.head_pos < self.head.len() {
            let n = buf.len().min(self.head.len() - self.head_pos);
            buf[..n].copy_from_slice(&self.head[self.head_pos..self.head_pos + n]);
            self.head_pos += n;
            return Ok(n);
        }
        if self.done {
            return Ok(0);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        let n = match stream.read(buf) {
            Ok(n) => n,
            Err(e) => {
                feed.failure = Some(EngineFailure::from(e).with_context(&self.item.path));
                return Err(aborted());
            }
        };
        if n == 0 {
            self.stream = None;
            self.done = true;
            return Ok(0);
        }
        feed.completed += n as u64;
        if let Err(failure) = feed.callback.set_completed(feed.completed) {
            feed.failure = Some(failure);
            return Err(aborted());
        }
        Ok(n)
    }
}

/// Stores one item in its own block, or as an empty entry when its source
/// turns out to be empty.
fn push_item<'f, 'c, W: Write + Seek>(
    writer: &mut SevenZWriter<W>,
    feed: &'f RefCell<Feed<'c>>,
    item: &'f PendingItem,
) -> Result<(), sevenz_rust::Error> {
    if item.is_dir {
        writer.push_archive_entry::<&[u8]>(archive_entry(item), None)?;
        return Ok(());
    }
    let mut reader = LazyItemReader::new(feed, item);
    if reader.has_data().map_err(sevenz_rust::Error::io)? {
        writer.push_archive_entry(archive_entry(item), Some(reader))?;
    } else {
        writer.push_archive_entry::<&[u8]>(archive_entry(item), None)?;
    }
    Ok(())
}

/// Stores consecutive non-directory items as one solid block. Members keep
/// whatever their source yields, so an empty one becomes a zero-length
/// substream.
fn push_run<'f, 'c, W: Write + Seek>(
    writer: &mut SevenZWriter<W>,
    feed: &'f RefCell<Feed<'c>>,
    run: &mut Vec<&'f PendingItem>,
) -> Result<(), sevenz_rust::Error> {
    match run.as_slice() {
        [] => {}
        [item] => push_item(writer, feed, item)?,
        members => {
            let entries = members
                .iter()
                .map(|item| {
                    let mut entry = archive_entry(item);
                    entry.has_stream = true;
                    entry
                })
                .collect();
            let readers = members
                .iter()
                .map(|item| SourceReader::new(LazyItemReader::new(feed, item)))
                .collect();
            writer.push_archive_entries(entries, SeqReader::new(readers))?;
        }
    }
    run.clear();
    Ok(())
}

/// Forwards writes to the archive target. Once armed it keeps a copy of
/// everything written from the arming position onward, plus the signature
/// header rewritten at offset zero.
struct HeaderTap {
    inner: Box<dyn OutStream>,
    pos: u64,
    armed: Rc<Cell<bool>>,
    tail_start: Option<u64>,
    tail: Vec<u8>,
    signature: Vec<u8>,
}

impl HeaderTap {
    fn new(inner: Box<dyn OutStream>, armed: Rc<Cell<bool>>) -> Self {
        Self {
            inner,
            pos: 0,
            armed,
            tail_start: None,
            tail: Vec::new(),
            signature: Vec::new(),
        }
    }

    fn record(&mut self, bytes: &[u8]) {
        let start = *self.tail_start.get_or_insert(self.pos);
        if self.pos == start + self.tail.len() as u64 {
            self.tail.extend_from_slice(bytes);
        } else if self.pos == self.signature.len() as u64 && self.pos < SIGNATURE_HEADER_SIZE {
            self.signature.extend_from_slice(bytes);
        }
    }
}

impl Write for HeaderTap {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if self.armed.get() {
            self.record(&buf[..n]);
        }
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for HeaderTap {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.inner.seek(pos)?;
        Ok(self.pos)
    }
}

const SIGNATURE_HEADER_SIZE: u64 = 32;
const K_END: u8 = 0x00;
const K_HEADER: u8 = 0x01;
const K_PACK_INFO: u8 = 0x06;
const K_UNPACK_INFO: u8 = 0x07;
const K_SIZE: u8 = 0x09;
const K_CRC: u8 = 0x0A;
const K_FOLDER: u8 = 0x0B;
const K_CODERS_UNPACK_SIZE: u8 = 0x0C;
const K_ENCODED_HEADER: u8 = 0x17;

/// Appends a 7z variable-length number.
fn write_number(out: &mut Vec<u8>, value: u64) {
    let mut first = 0u8;
    let mut mask = 0x80u8;
    let mut extra = 0;
    while extra < 8 {
        if value < 1u64 << (7 * (extra + 1)) {
            first |= (value >> (8 * extra)) as u8;
            break;
        }
        first |= mask;
        mask >>= 1;
        extra += 1;
    }
    out.push(first);
    for i in 0..extra {
        out.push((value >> (8 * i)) as u8);
    }
}

fn header_failure(message: &str) -> EngineFailure {
    EngineFailure::new(EngineCode::E_FAIL, format!("cannot encrypt 7z header: {message}"))
}

/// Makes sure the archive header just written by `finish` is encrypted.
///
/// The writer falls back to a plain header when compressing it does not pay
/// off, which is the usual case for small archives. Such a header is moved
/// into an AES-only encoded header in place.
#[cfg(feature = "aes")]
fn seal_header(tap: &mut HeaderTap, password: &Password) -> EngineResult<()> {
    use sevenz_rust::lzma::CountingWriter;
    use sevenz_rust::{Aes256Sha256Encoder, AesEncoderOptions};

    let (Some(tail_start), Some(signature)) =
        (tap.tail_start, tap.signature.get(..SIGNATURE_HEADER_SIZE as usize))
    else {
        return Err(header_failure("header was not captured"));
    };
    let field = |range: Range<usize>| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&signature[range]);
        u64::from_le_bytes(bytes)
    };
    let header_pos = SIGNATURE_HEADER_SIZE + field(12..20);
    let header_len = field(20..28) as usize;
    let magic: [u8; 8] = {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&signature[..8]);
        magic
    };
    let offset = header_pos
        .checked_sub(tail_start)
        .map(|o| o as usize)
        .ok_or_else(|| header_failure("header lies before the captured range"))?;
    match tap.tail.get(offset) {
        Some(&K_ENCODED_HEADER) if offset > 0 => return Ok(()),
        Some(&K_HEADER) if offset == 0 => {}
        _ => return Err(header_failure("unexpected header layout")),
    }
    let Some(raw) = tap.tail.get(..header_len) else {
        return Err(header_failure("header is truncated"));
    };

    let options = AesEncoderOptions::new(sevenz_rust::Password::from(password.as_str()));
    let mut sealed = Vec::with_capacity(raw.len() + 16);
    {
        let mut encoder = Aes256Sha256Encoder::new(CountingWriter::new(&mut sealed), &options)
            .map_err(seven_failure)?;
        encoder.write_all(raw)?;
        encoder.write(&[])?;
    }

    let properties = options.properties();
    let mut header = vec![K_ENCODED_HEADER, K_PACK_INFO];
    write_number(&mut header, header_pos - SIGNATURE_HEADER_SIZE);
    write_number(&mut header, 1);
    header.push(K_SIZE);
    write_number(&mut header, sealed.len() as u64);
    header.extend_from_slice(&[K_END, K_UNPACK_INFO, K_FOLDER]);
    write_number(&mut header, 1);
    // Inline folder with a single AES coder.
    header.extend_from_slice(&[0, 1, 0x20 | SevenZMethod::ID_AES256SHA256.len() as u8]);
    header.extend_from_slice(SevenZMethod::ID_AES256SHA256);
    write_number(&mut header, properties.len() as u64);
    header.extend_from_slice(&properties);
    header.push(K_CODERS_UNPACK_SIZE);
    write_number(&mut header, raw.len() as u64);
    header.extend_from_slice(&[K_CRC, 1]);
    header.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
    header.extend_from_slice(&[K_END, K_END]);

    let next_header_pos = header_pos + sealed.len() as u64;
    let mut start = [0u8; SIGNATURE_HEADER_SIZE as usize];
    start[..8].copy_from_slice(&magic);
    start[12..20].copy_from_slice(&(next_header_pos - SIGNATURE_HEADER_SIZE).to_le_bytes());
    start[20..28].copy_from_slice(&(header.len() as u64).to_le_bytes());
    start[28..32].copy_from_slice(&crc32fast::hash(&header).to_le_bytes());
    let start_crc = crc32fast::hash(&start[12..]);
    start[8..12].copy_from_slice(&start_crc.to_le_bytes());

    let inner = &mut tap.inner;
    inner.seek(SeekFrom::Start(header_pos))?;
    inner.write_all(&sealed)?;
    inner.write_all(&header)?;
    inner.set_size(next_header_pos + header.len() as u64)?;
    inner.seek(SeekFrom::Start(0))?;
    inner.write_all(&start)?;
    log::debug!("sealed {} byte 7z header with AES", raw.len());
    Ok(())
}

#[cfg(not(feature = "aes"))]
fn seal_header(_tap: &mut HeaderTap, _password: &Password) -> EngineResult<()> {
    Err(EngineFailure::new(
        EngineCode::NOT_SUPPORTED,
        "encryption support is not compiled in (feature `aes`)",
    ))
}

impl OutArchive for SevenZipOut {
    fn set_properties(&mut self, properties: &[(String, PropValue)]) -> EngineResult<()> {
        for (name, value) in properties {
            match name.to_ascii_lowercase().as_str() {
                prop_names::LEVEL => {
                    let level = value
                        .as_u32()
                        .filter(|l| *l <= 9)
                        .ok_or_else(|| invalid(format!("invalid compression level {value}")))?;
                    self.level = level;
                }
                prop_names::SOLID => {
                    self.solid = value
                        .as_bool()
                        .ok_or_else(|| invalid(format!("invalid solid flag {value}")))?;
                }
                prop_names::DICTIONARY => {
                    self.dictionary = Some(
                        value
                            .as_u32()
                            .filter(|d| *d >= 4096)
                            .ok_or_else(|| invalid(format!("invalid dictionary size {value}")))?,
                    );
                }
                prop_names::THREADS => {
                    log::debug!("7z writer encodes on one thread, ignoring mt={value}");
                }
                prop_names::METHOD => {
                    self.method = match value.as_str().map(str::to_ascii_lowercase).as_deref() {
                        Some("lzma2") => Method::Lzma2,
                        Some("lzma") => Method::Lzma,
                        _ => {
                            return Err(EngineFailure::new(
                                EngineCode::NOT_SUPPORTED,
                                format!("unsupported method for 7z: {value}"),
                            ));
                        }
                    };
                }
                prop_names::ENCRYPT_HEADERS => {
                    self.encrypt_headers = value
                        .as_bool()
                        .ok_or_else(|| invalid(format!("invalid header encryption flag {value}")))?;
                }
                other => return Err(invalid(format!("unknown 7z property '{other}'"))),
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

        if let Some(item) = items.iter().find(|item| item.hard_link.is_some()) {
            return Err(EngineFailure::new(
                EngineCode::NOT_SUPPORTED,
                format!("7z cannot store hard link '{}'", item.path),
            ));
        }

        let armed = Rc::new(Cell::new(false));
        let mut writer =
            SevenZWriter::new(HeaderTap::new(out, Rc::clone(&armed))).map_err(seven_failure)?;
        writer.set_content_methods(self.content_methods(password.as_ref())?);
        writer.set_encrypt_header(self.encrypt_headers && password.is_some());

        let feed = RefCell::new(Feed {
            callback,
            completed: 0,
            failure: None,
        });
        let solid = self.solid;
        let written = (|| -> Result<(), sevenz_rust::Error> {
            let mut run = Vec::new();
            for item in &items {
                if item.is_dir {
                    push_run(&mut writer, &feed, &mut run)?;
                    push_item(&mut writer, &feed, item)?;
                } else if solid {
                    run.push(item);
                } else {
                    push_item(&mut writer, &feed, item)?;
                }
            }
            push_run(&mut writer, &feed, &mut run)
        })();

        let Feed {
            callback, failure, ..
        } = feed.into_inner();
        if let Some(failure) = failure {
            return Err(failure);
        }
        written.map_err(seven_failure)?;

        armed.set(true);
        let mut tap = writer.finish()?;
        if let Some(password) = password.as_ref().filter(|_| self.encrypt_headers) {
            seal_header(&mut tap, password)?;
        }
        tap.flush()?;
        drop(tap);
        log::debug!("wrote 7z archive with {} items", items.len());
        update::report_success(callback, &items)
    }
}
