//! Creating archives through the C ABI.

use std::ffi::{c_char, c_int, c_void};
use std::path::Path;

use super::{
    Failure, SzProgressCallback, SzResult, bytes_arg, call, check_out, foreign_progress,
    format_from_code, handle_arg, level_from_code, opt_str_arg, release, str_arg, write_out,
};
use crate::progress::progress_fn;
use crate::{ArchiveFormat, ArchiveWriter};

/// Archive writer handle.
pub struct SzWriter {
    writer: ArchiveWriter,
    /// Bytes of a finalized in-memory archive.
    data: Option<Vec<u8>>,
}

fn writable_format(code: c_int) -> Result<ArchiveFormat, Failure> {
    match format_from_code(code)? {
        ArchiveFormat::Unknown => Err(Failure::new(
            SzResult::UnsupportedFormat,
            "a concrete format is needed to create an archive",
        )),
        format if !format.info().can_write => Err(Failure::new(
            SzResult::UnsupportedFormat,
            format!("cannot create {format} archives"),
        )),
        format => Ok(format),
    }
}

fn hand_out(writer: ArchiveWriter, out: *mut *mut SzWriter) {
    let handle = Box::into_raw(Box::new(SzWriter { writer, data: None }));
    // SAFETY: `out` was checked by the caller.
    unsafe { write_out(out, handle) };
}

/// Starts an archive at `path`. Nothing is written before
/// [`sz_writer_finalize`].
///
/// # Safety
///
/// `path` is a NUL-terminated string; `out` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_create(
    path: *const c_char,
    format: c_int,
    out: *mut *mut SzWriter,
) -> SzResult {
    call("sz_writer_create", || {
        check_out(out, "out")?;
        // SAFETY: forwarded contract.
        let path = unsafe { str_arg(path, "path") }?;
        let format = writable_format(format)?;
        hand_out(ArchiveWriter::create(path, format)?, out);
        Ok(())
    })
}

/// Starts an archive kept in memory; read it with
/// [`sz_writer_get_memory_data`] after finalizing.
///
/// # Safety
///
/// `out` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_create_memory(
    format: c_int,
    out: *mut *mut SzWriter,
) -> SzResult {
    call("sz_writer_create_memory", || {
        check_out(out, "out")?;
        let format = writable_format(format)?;
        hand_out(ArchiveWriter::create_in_memory(format)?, out);
        Ok(())
    })
}

/// Sets the compression level, 0-9.
///
/// # Safety
///
/// `writer` is a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_set_compression_level(
    writer: *mut SzWriter,
    level: c_int,
) -> SzResult {
    call("sz_writer_set_compression_level", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        handle.writer.set_level(level_from_code(level)?)?;
        Ok(())
    })
}

/// Encrypts item data with `password`.
///
/// # Safety
///
/// `writer` is a live handle; `password` is NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_set_password(
    writer: *mut SzWriter,
    password: *const c_char,
) -> SzResult {
    call("sz_writer_set_password", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        // SAFETY: forwarded contract.
        let password = unsafe { str_arg(password, "password") }?;
        handle.writer.set_password(password)?;
        Ok(())
    })
}

/// Encrypts the item listing too when `enabled` is non-zero (7z only).
///
/// # Safety
///
/// `writer` is a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_set_encrypted_headers(
    writer: *mut SzWriter,
    enabled: c_int,
) -> SzResult {
    call("sz_writer_set_encrypted_headers", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        handle.writer.set_encrypt_headers(enabled != 0)?;
        Ok(())
    })
}

/// Turns solid compression on or off (7z only).
///
/// # Safety
///
/// `writer` is a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_set_solid_mode(
    writer: *mut SzWriter,
    enabled: c_int,
) -> SzResult {
    call("sz_writer_set_solid_mode", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        handle.writer.set_solid(enabled != 0)?;
        Ok(())
    })
}

/// Installs the callback run while finalizing; returning 0 from it
/// cancels. A null callback removes an earlier one.
///
/// # Safety
///
/// `writer` is a live handle; `user_data` is whatever `callback` expects
/// and stays valid until finalize returns.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_set_progress_callback(
    writer: *mut SzWriter,
    callback: SzProgressCallback,
    user_data: *mut c_void,
) -> SzResult {
    call("sz_writer_set_progress_callback", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        match foreign_progress(callback, user_data) {
            Some(reporter) => handle.writer.set_progress(reporter)?,
            None => handle.writer.set_progress(progress_fn(|_, _| true))?,
        }
        Ok(())
    })
}

/// Queues the file at `file_path`, stored as `archive_path` or, when that
/// is null, under its file name.
///
/// # Safety
///
/// `writer` is a live handle; `file_path` is NUL-terminated;
/// `archive_path` is null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_add_file(
    writer: *mut SzWriter,
    file_path: *const c_char,
    archive_path: *const c_char,
) -> SzResult {
    call("sz_writer_add_file", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        // SAFETY: forwarded contract.
        let file_path = unsafe { str_arg(file_path, "file_path") }?;
        // SAFETY: forwarded contract.
        match unsafe { opt_str_arg(archive_path, "archive_path") }? {
            Some(name) => handle.writer.add_file_as(file_path, name)?,
            None => handle.writer.add_file(file_path)?,
        }
        Ok(())
    })
}

/// Queues the directory at `dir_path` under its own name, with everything
/// below it when `recursive` is non-zero or only its direct children
/// otherwise.
///
/// # Safety
///
/// `writer` is a live handle; `dir_path` is NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_add_directory(
    writer: *mut SzWriter,
    dir_path: *const c_char,
    recursive: c_int,
) -> SzResult {
    call("sz_writer_add_directory", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        // SAFETY: forwarded contract.
        let dir_path = unsafe { str_arg(dir_path, "dir_path") }?;
        if recursive != 0 {
            handle.writer.add_directory(dir_path)?;
        } else {
            handle.writer.add_directory_shallow(Path::new(dir_path))?;
        }
        Ok(())
    })
}

/// Queues `size` bytes at `data` as `archive_path`. The bytes are copied.
///
/// # Safety
///
/// `writer` is a live handle; `data` is valid for `size` bytes;
/// `archive_path` is NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_add_memory(
    writer: *mut SzWriter,
    data: *const c_void,
    size: usize,
    archive_path: *const c_char,
) -> SzResult {
    call("sz_writer_add_memory", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        // SAFETY: forwarded contract.
        let archive_path = unsafe { str_arg(archive_path, "archive_path") }?;
        // SAFETY: forwarded contract.
        let bytes = unsafe { bytes_arg(data, size, "data") }?;
        handle.writer.add_buffer(archive_path, bytes)?;
        Ok(())
    })
}

/// Stores the number of queued items in `count`.
///
/// # Safety
///
/// `writer` is a live handle; `count` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_get_pending_count(
    writer: *mut SzWriter,
    count: *mut usize,
) -> SzResult {
    call("sz_writer_get_pending_count", || {
        check_out(count, "count")?;
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        // SAFETY: checked above.
        unsafe { write_out(count, handle.writer.item_count()) };
        Ok(())
    })
}

/// Writes the archive. One-shot; the handle stays alive and is released
/// with [`sz_writer_cancel`].
///
/// # Safety
///
/// `writer` is a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_finalize(writer: *mut SzWriter) -> SzResult {
    call("sz_writer_finalize", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        handle.writer.finalize()?;
        if handle.writer.is_in_memory() {
            handle.data = Some(handle.writer.take_buffer()?);
        }
        Ok(())
    })
}

/// Points `out_data` at the bytes of a finalized in-memory archive. They
/// belong to the handle and live until [`sz_writer_cancel`].
///
/// # Safety
///
/// `writer` is a live handle; `out_data` and `out_size` are writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_get_memory_data(
    writer: *mut SzWriter,
    out_data: *mut *const c_void,
    out_size: *mut usize,
) -> SzResult {
    call("sz_writer_get_memory_data", || {
        check_out(out_data, "out_data")?;
        check_out(out_size, "out_size")?;
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(writer, "writer") }?;
        let data = match &handle.data {
            Some(data) => data,
            None if !handle.writer.is_in_memory() => {
                return Err(Failure::new(
                    SzResult::InvalidArgument,
                    "writer does not target memory",
                ));
            }
            None => return Err(Failure::new(SzResult::Fail, "archive not finalized")),
        };
        // SAFETY: both checked above.
        unsafe {
            write_out(out_data, data.as_ptr().cast());
            write_out(out_size, data.len());
        }
        Ok(())
    })
}

/// Releases a writer handle, finalized or not. An unfinalized archive is
/// never written. Null is ignored.
///
/// # Safety
///
/// `writer` is null or a handle from `sz_writer_create*` not yet released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_writer_cancel(writer: *mut SzWriter) {
    if writer.is_null() {
        return;
    }
    release("sz_writer_cancel", || {
        // SAFETY: the handle came from `Box::into_raw` and is released once.
        let handle = unsafe { Box::from_raw(writer) };
        if !handle.writer.is_finalized() {
            log::debug!(
                "discarding unfinished {} archive with {} items",
                handle.writer.format(),
                handle.writer.item_count()
            );
        }
    });
}
