//! Reading archives through the C ABI.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;

use super::{
    Failure, FfiResult, SzProgressCallback, SzResult, call, check_out, foreign_progress,
    format_from_code, format_to_code, handle_arg, release, return_buffer, str_arg, write_out,
};
use crate::read::{ArchiveItemInfo, ExtractOptions, OverwritePolicy};
use crate::{ArchiveFormat, ArchiveReader, Timestamp};

/// Open archive handle.
pub struct SzArchive {
    reader: ArchiveReader,
}

impl SzArchive {
    fn check_index(&self, index: usize) -> FfiResult<()> {
        let count = self.reader.item_count();
        if index < count {
            Ok(())
        } else {
            Err(Failure::new(
                SzResult::IndexOutOfRange,
                format!("item index {index} out of range ({count} items)"),
            ))
        }
    }
}

/// Archive-level summary.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SzArchiveInfo {
    /// `SZ_FORMAT_*` code, -1 for formats without one.
    pub format: c_int,
    /// Number of items.
    pub item_count: usize,
    /// Sum of unpacked item sizes.
    pub total_size: u64,
    /// Size of the archive itself.
    pub packed_size: u64,
    /// Non-zero for solid archives.
    pub is_solid: c_int,
    /// Non-zero when opened from volumes.
    pub is_multi_volume: c_int,
    /// Non-zero when the listing is encrypted.
    pub has_encrypted_headers: c_int,
}

/// Metadata of one item. `path` is owned by the library until
/// [`sz_item_info_free`].
#[repr(C)]
#[derive(Debug)]
pub struct SzItemInfo {
    /// Position in the archive.
    pub index: usize,
    /// Archive path, `/`-separated.
    pub path: *mut c_char,
    /// Unpacked size.
    pub size: u64,
    /// Packed size, 0 when unknown.
    pub packed_size: u64,
    /// CRC-32 of the content when `has_crc` is set.
    pub crc: u32,
    /// Non-zero when `crc` is meaningful.
    pub has_crc: c_int,
    /// Unix seconds, 0 when unknown.
    pub creation_time: i64,
    /// Unix seconds, 0 when unknown.
    pub modification_time: i64,
    /// Non-zero for directories.
    pub is_directory: c_int,
    /// Non-zero for encrypted items.
    pub is_encrypted: c_int,
}

impl SzItemInfo {
    fn from_item(item: ArchiveItemInfo) -> Self {
        let seconds = |time: Option<Timestamp>| time.map_or(0, |t| t.as_unix_secs());
        let path = CString::new(item.path.replace('\0', "_")).unwrap_or_default();
        Self {
            index: item.index,
            path: path.into_raw(),
            size: item.size,
            packed_size: item.packed_size,
            crc: item.crc.unwrap_or(0),
            has_crc: c_int::from(item.crc.is_some()),
            creation_time: seconds(item.created),
            modification_time: seconds(item.modified),
            is_directory: c_int::from(item.is_dir),
            is_encrypted: c_int::from(item.encrypted),
        }
    }
}

fn hand_out(reader: ArchiveReader, out: *mut *mut SzArchive) {
    let handle = Box::into_raw(Box::new(SzArchive { reader }));
    // SAFETY: `out` was checked by the caller.
    unsafe { write_out(out, handle) };
}

/// Opens the archive at `path`, detecting its format.
///
/// # Safety
///
/// `path` is a NUL-terminated string; `out` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_open(
    path: *const c_char,
    out: *mut *mut SzArchive,
) -> SzResult {
    call("sz_archive_open", || {
        check_out(out, "out")?;
        // SAFETY: forwarded contract.
        let path = unsafe { str_arg(path, "path") }?;
        hand_out(ArchiveReader::open(path)?, out);
        Ok(())
    })
}

/// Opens an archive held in memory. The bytes are copied.
///
/// # Safety
///
/// `data` is valid for `size` bytes; `out` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_open_memory(
    data: *const c_void,
    size: usize,
    format: c_int,
    out: *mut *mut SzArchive,
) -> SzResult {
    call("sz_archive_open_memory", || {
        check_out(out, "out")?;
        // SAFETY: forwarded contract.
        let bytes = unsafe { super::bytes_arg(data, size, "data") }?.to_vec();
        let reader = match format_from_code(format)? {
            ArchiveFormat::Unknown => ArchiveReader::open_buffer(bytes)?,
            format => ArchiveReader::open_buffer_with_format(bytes, format)?,
        };
        hand_out(reader, out);
        Ok(())
    })
}

/// Closes an archive handle. Null is ignored.
///
/// # Safety
///
/// `archive` is null or a handle from `sz_archive_open*` not yet closed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_close(archive: *mut SzArchive) {
    if archive.is_null() {
        return;
    }
    release("sz_archive_close", || {
        // SAFETY: the handle came from `Box::into_raw` and is released once.
        drop(unsafe { Box::from_raw(archive) });
    });
}

/// Fills `info` with the archive summary.
///
/// # Safety
///
/// `archive` is a live handle; `info` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_get_info(
    archive: *mut SzArchive,
    info: *mut SzArchiveInfo,
) -> SzResult {
    call("sz_archive_get_info", || {
        check_out(info, "info")?;
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        let summary = archive.reader.info()?;
        let value = SzArchiveInfo {
            format: format_to_code(summary.format),
            item_count: summary.item_count,
            total_size: summary.total_size,
            packed_size: summary.physical_size,
            is_solid: c_int::from(summary.is_solid),
            is_multi_volume: c_int::from(summary.is_multi_volume),
            has_encrypted_headers: c_int::from(summary.has_encrypted_header),
        };
        // SAFETY: checked above.
        unsafe { write_out(info, value) };
        Ok(())
    })
}

/// Stores the number of items in `count`.
///
/// # Safety
///
/// `archive` is a live handle; `count` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_get_item_count(
    archive: *mut SzArchive,
    count: *mut usize,
) -> SzResult {
    call("sz_archive_get_item_count", || {
        check_out(count, "count")?;
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        // SAFETY: checked above.
        unsafe { write_out(count, archive.reader.item_count()) };
        Ok(())
    })
}

/// Fills `info` with the metadata of item `index`. Release it with
/// [`sz_item_info_free`].
///
/// # Safety
///
/// `archive` is a live handle; `info` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_get_item_info(
    archive: *mut SzArchive,
    index: usize,
    info: *mut SzItemInfo,
) -> SzResult {
    call("sz_archive_get_item_info", || {
        check_out(info, "info")?;
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        archive.check_index(index)?;
        let item = archive.reader.item_info(index)?;
        // SAFETY: checked above.
        unsafe { write_out(info, SzItemInfo::from_item(item)) };
        Ok(())
    })
}

/// Releases the strings inside `info`; the struct itself stays with the
/// caller. Null is ignored and a second call is harmless.
///
/// # Safety
///
/// `info` is null or was filled by [`sz_archive_get_item_info`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_item_info_free(info: *mut SzItemInfo) {
    // SAFETY: forwarded contract.
    let Some(info) = (unsafe { info.as_mut() }) else {
        return;
    };
    let path = std::mem::replace(&mut info.path, ptr::null_mut());
    if !path.is_null() {
        // SAFETY: the path came from `CString::into_raw`.
        drop(unsafe { CString::from_raw(path) });
    }
}

/// Extracts every item below `dest`, replacing existing files. The
/// progress callback may be null.
///
/// # Safety
///
/// `archive` is a live handle; `dest` is a NUL-terminated string;
/// `user_data` is whatever `progress` expects.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_extract_all(
    archive: *mut SzArchive,
    dest: *const c_char,
    progress: SzProgressCallback,
    user_data: *mut c_void,
) -> SzResult {
    call("sz_archive_extract_all", || {
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        // SAFETY: forwarded contract.
        let dest = unsafe { str_arg(dest, "dest") }?;
        let mut options = ExtractOptions::new().overwrite(OverwritePolicy::Overwrite);
        if let Some(reporter) = foreign_progress(progress, user_data) {
            options = options.progress(reporter);
        }
        archive.reader.extract_all_with(dest, options)?.into_result()?;
        Ok(())
    })
}

/// Extracts item `index` to the file `dest_path`.
///
/// # Safety
///
/// `archive` is a live handle; `dest_path` is a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_extract_item(
    archive: *mut SzArchive,
    index: usize,
    dest_path: *const c_char,
) -> SzResult {
    call("sz_archive_extract_item", || {
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        // SAFETY: forwarded contract.
        let dest_path = unsafe { str_arg(dest_path, "dest_path") }?;
        archive.check_index(index)?;
        archive.reader.extract_to_file(index, dest_path)?;
        Ok(())
    })
}

/// Extracts item `index` into a new buffer released with
/// [`super::sz_memory_free`].
///
/// # Safety
///
/// `archive` is a live handle; `out_data` and `out_size` are writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_extract_to_memory(
    archive: *mut SzArchive,
    index: usize,
    out_data: *mut *mut c_void,
    out_size: *mut usize,
) -> SzResult {
    call("sz_archive_extract_to_memory", || {
        check_out(out_data, "out_data")?;
        check_out(out_size, "out_size")?;
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        archive.check_index(index)?;
        let data = archive.reader.extract_to_memory(index)?;
        // SAFETY: both checked above.
        unsafe { return_buffer(&data, out_data, out_size) }
    })
}

/// Sets the password for later listing and extraction; null clears it.
///
/// # Safety
///
/// `archive` is a live handle; `password` is null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_set_password(
    archive: *mut SzArchive,
    password: *const c_char,
) -> SzResult {
    call("sz_archive_set_password", || {
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        // SAFETY: forwarded contract.
        match unsafe { super::opt_str_arg(password, "password") }? {
            Some(password) => archive.reader.set_password(password),
            None => archive.reader.clear_password(),
        }
        Ok(())
    })
}

/// Decodes every item without writing anything. Fails with the first
/// item's error.
///
/// # Safety
///
/// `archive` is a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_archive_test(archive: *mut SzArchive) -> SzResult {
    call("sz_archive_test", || {
        // SAFETY: forwarded contract.
        let archive = unsafe { handle_arg(archive, "archive") }?;
        archive.reader.test()?.into_result()?;
        Ok(())
    })
}
