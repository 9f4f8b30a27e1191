//! Stream compression and one-call helpers through the C ABI.

use std::ffi::{c_char, c_int, c_void};

use super::{
    Failure, SZ_FORMAT_BZIP2, SZ_FORMAT_GZIP, SZ_FORMAT_XZ, SzResult, bytes_arg, call, check_out,
    format_from_code, handle_arg, level_from_code, release, return_buffer, str_arg, write_out,
};
use crate::write::CompressionLevel;
use crate::{Compressor, convenience};

/// Stream compressor handle.
pub struct SzCompressor {
    compressor: Compressor,
}

/// Creates a compressor for gzip, bzip2 or xz streams.
///
/// # Safety
///
/// `out` is writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_compressor_create(
    format: c_int,
    level: c_int,
    out: *mut *mut SzCompressor,
) -> SzResult {
    call("sz_compressor_create", || {
        check_out(out, "out")?;
        if ![SZ_FORMAT_GZIP, SZ_FORMAT_BZIP2, SZ_FORMAT_XZ].contains(&format) {
            return Err(Failure::new(
                SzResult::UnsupportedFormat,
                format!("format code {format} is not a stream format"),
            ));
        }
        let compressor = Compressor::new(format_from_code(format)?)?.with_level(level_from_code(level)?)?;
        let handle = Box::into_raw(Box::new(SzCompressor { compressor }));
        // SAFETY: checked above.
        unsafe { write_out(out, handle) };
        Ok(())
    })
}

/// Releases a compressor handle. Null is ignored.
///
/// # Safety
///
/// `compressor` is null or a handle from [`sz_compressor_create`] not yet
/// released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_compressor_destroy(compressor: *mut SzCompressor) {
    if compressor.is_null() {
        return;
    }
    release("sz_compressor_destroy", || {
        // SAFETY: the handle came from `Box::into_raw` and is released once.
        drop(unsafe { Box::from_raw(compressor) });
    });
}

/// Compresses `input_size` bytes into a new buffer released with
/// [`super::sz_memory_free`].
///
/// # Safety
///
/// `compressor` is a live handle; `input` is valid for `input_size` bytes;
/// `output` and `output_size` are writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_compress_data(
    compressor: *mut SzCompressor,
    input: *const c_void,
    input_size: usize,
    output: *mut *mut c_void,
    output_size: *mut usize,
) -> SzResult {
    call("sz_compress_data", || {
        check_out(output, "output")?;
        check_out(output_size, "output_size")?;
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(compressor, "compressor") }?;
        // SAFETY: forwarded contract.
        let input = unsafe { bytes_arg(input, input_size, "input") }?;
        let packed = handle.compressor.compress(input)?;
        // SAFETY: both checked above.
        unsafe { return_buffer(&packed, output, output_size) }
    })
}

/// Decompresses a complete stream into a new buffer released with
/// [`super::sz_memory_free`].
///
/// # Safety
///
/// Same as [`sz_compress_data`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_decompress_data(
    compressor: *mut SzCompressor,
    input: *const c_void,
    input_size: usize,
    output: *mut *mut c_void,
    output_size: *mut usize,
) -> SzResult {
    call("sz_decompress_data", || {
        check_out(output, "output")?;
        check_out(output_size, "output_size")?;
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(compressor, "compressor") }?;
        // SAFETY: forwarded contract.
        let input = unsafe { bytes_arg(input, input_size, "input") }?;
        let data = handle.compressor.decompress(input)?;
        // SAFETY: both checked above.
        unsafe { return_buffer(&data, output, output_size) }
    })
}

/// Compresses the file `input_path` into `output_path`.
///
/// # Safety
///
/// `compressor` is a live handle; both paths are NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_compress_file(
    compressor: *mut SzCompressor,
    input_path: *const c_char,
    output_path: *const c_char,
) -> SzResult {
    call("sz_compress_file", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(compressor, "compressor") }?;
        // SAFETY: forwarded contract.
        let (input, output) = unsafe { (str_arg(input_path, "input_path")?, str_arg(output_path, "output_path")?) };
        handle.compressor.compress_file(input, output)?;
        Ok(())
    })
}

/// Decompresses the file `input_path` into `output_path`.
///
/// # Safety
///
/// Same as [`sz_compress_file`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_decompress_file(
    compressor: *mut SzCompressor,
    input_path: *const c_char,
    output_path: *const c_char,
) -> SzResult {
    call("sz_decompress_file", || {
        // SAFETY: forwarded contract.
        let handle = unsafe { handle_arg(compressor, "compressor") }?;
        // SAFETY: forwarded contract.
        let (input, output) = unsafe { (str_arg(input_path, "input_path")?, str_arg(output_path, "output_path")?) };
        handle.compressor.decompress_file(input, output)?;
        Ok(())
    })
}

/// Extracts every item of `archive_path` below `dest_dir`.
///
/// # Safety
///
/// Both paths are NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_extract_simple(
    archive_path: *const c_char,
    dest_dir: *const c_char,
) -> SzResult {
    call("sz_extract_simple", || {
        // SAFETY: forwarded contract.
        let (archive, dest) = unsafe { (str_arg(archive_path, "archive_path")?, str_arg(dest_dir, "dest_dir")?) };
        convenience::extract(archive, dest)?;
        Ok(())
    })
}

/// Extracts every item of an encrypted `archive_path` below `dest_dir`.
///
/// # Safety
///
/// All three strings are NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_extract_with_password(
    archive_path: *const c_char,
    dest_dir: *const c_char,
    password: *const c_char,
) -> SzResult {
    call("sz_extract_with_password", || {
        // SAFETY: forwarded contract.
        let (archive, dest, password) = unsafe {
            (
                str_arg(archive_path, "archive_path")?,
                str_arg(dest_dir, "dest_dir")?,
                str_arg(password, "password")?,
            )
        };
        convenience::extract_with_password(archive, dest, password)?;
        Ok(())
    })
}

/// Packs the file or directory `source_path` into a new archive at
/// `archive_path` at normal compression.
///
/// # Safety
///
/// Both paths are NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_compress_simple(
    source_path: *const c_char,
    archive_path: *const c_char,
    format: c_int,
) -> SzResult {
    call("sz_compress_simple", || {
        // SAFETY: forwarded contract.
        let (source, archive) =
            unsafe { (str_arg(source_path, "source_path")?, str_arg(archive_path, "archive_path")?) };
        let format = match format_from_code(format)? {
            crate::ArchiveFormat::Unknown => crate::ArchiveFormat::SevenZip,
            format => format,
        };
        convenience::compress_with(source, archive, format, CompressionLevel::Normal, None)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::ptr;

    use super::*;
    use crate::ffi::{SZ_FORMAT_7Z, SZ_FORMAT_ZIP, sz_memory_free};

    fn create(format: c_int, level: c_int) -> (SzResult, *mut SzCompressor) {
        let mut handle = ptr::null_mut();
        let result = unsafe { sz_compressor_create(format, level, &mut handle) };
        (result, handle)
    }

    #[test]
    fn gzip_pattern_round_trip() {
        let input: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
        let (result, handle) = create(SZ_FORMAT_GZIP, 5);
        assert_eq!(result, SzResult::Ok);

        let mut packed = ptr::null_mut();
        let mut packed_size = 0usize;
        let result = unsafe {
            sz_compress_data(handle, input.as_ptr().cast(), input.len(), &mut packed, &mut packed_size)
        };
        assert_eq!(result, SzResult::Ok);
        assert!(packed_size > 0);

        let mut plain = ptr::null_mut();
        let mut plain_size = 0usize;
        let result = unsafe { sz_decompress_data(handle, packed, packed_size, &mut plain, &mut plain_size) };
        assert_eq!(result, SzResult::Ok);
        let view = unsafe { std::slice::from_raw_parts(plain.cast::<u8>(), plain_size) };
        assert_eq!(view, input.as_slice());

        unsafe {
            sz_memory_free(packed);
            sz_memory_free(plain);
            sz_compressor_destroy(handle);
        }
    }

    #[test]
    fn only_stream_formats() {
        assert_eq!(create(SZ_FORMAT_7Z, 5).0, SzResult::UnsupportedFormat);
        assert_eq!(create(SZ_FORMAT_ZIP, 5).0, SzResult::UnsupportedFormat);
        assert_eq!(create(SZ_FORMAT_XZ, 11).0, SzResult::InvalidArgument);
        unsafe { sz_compressor_destroy(ptr::null_mut()) };
    }

    #[test]
    fn garbage_is_corrupt() {
        let (_, handle) = create(SZ_FORMAT_BZIP2, 1);
        let junk = b"not bzip2 at all";
        let mut out = ptr::null_mut();
        let mut size = 0usize;
        let result = unsafe { sz_decompress_data(handle, junk.as_ptr().cast(), junk.len(), &mut out, &mut size) };
        assert_ne!(result, SzResult::Ok);
        assert!(out.is_null());
        unsafe { sz_compressor_destroy(handle) };
    }

    #[test]
    fn simple_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("hello.txt");
        std::fs::write(&source, b"hello").unwrap();
        let c = |p: &std::path::Path| CString::new(p.to_str().unwrap()).unwrap();
        let archive = dir.path().join("hello.zip");
        let out = dir.path().join("out");

        let result = unsafe { sz_compress_simple(c(&source).as_ptr(), c(&archive).as_ptr(), SZ_FORMAT_ZIP) };
        assert_eq!(result, SzResult::Ok);
        assert_eq!(unsafe { sz_extract_simple(c(&archive).as_ptr(), c(&out).as_ptr()) }, SzResult::Ok);
        assert_eq!(std::fs::read(out.join("hello.txt")).unwrap(), b"hello");

        let packed = dir.path().join("hello.txt.gz");
        let restored = dir.path().join("restored.txt");
        let (_, handle) = create(SZ_FORMAT_GZIP, 9);
        unsafe {
            assert_eq!(sz_compress_file(handle, c(&source).as_ptr(), c(&packed).as_ptr()), SzResult::Ok);
            assert_eq!(sz_decompress_file(handle, c(&packed).as_ptr(), c(&restored).as_ptr()), SzResult::Ok);
            sz_compressor_destroy(handle);
        }
        assert_eq!(std::fs::read(restored).unwrap(), b"hello");

        let missing = dir.path().join("missing.7z");
        assert_eq!(
            unsafe { sz_extract_simple(c(&missing).as_ptr(), c(&out).as_ptr()) },
            SzResult::FileNotFound
        );
    }
}
