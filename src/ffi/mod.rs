//! C ABI.
//!
//! Every exported function is prefixed `sz_`, returns an [`SzResult`] (or
//! nothing for release functions) and never unwinds: Rust errors and panics
//! become a result code, and the message is kept per thread for
//! [`sz_get_last_error_message`].
//!
//! # Memory
//!
//! - Handles are released with their `_close`, `_destroy` or `_cancel`
//!   function.
//! - Buffers returned through `void**` are released with [`sz_memory_free`].
//! - Strings inside [`SzItemInfo`] are released with [`sz_item_info_free`].
//! - Strings returned as `const char*` are owned by the library.
//!
//! # Threads
//!
//! A handle may move between threads but must not be used from two threads
//! at once. Progress callbacks run on the calling thread.

mod archive;
mod compress;
mod writer;

pub use archive::*;
pub use compress::*;
pub use writer::*;

use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::progress::ProgressReporter;
use crate::{ArchiveFormat, Error, ErrorCode};

/// Result of every fallible C ABI call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SzResult {
    /// Success.
    Ok = 0,
    /// Failure without a more specific code.
    Fail = 1,
    /// An allocation failed.
    OutOfMemory = 2,
    /// A file or directory does not exist.
    FileNotFound = 3,
    /// Access was refused.
    AccessDenied = 4,
    /// A pointer was null or a value was out of range.
    InvalidArgument = 5,
    /// The data is not an archive of a supported format.
    UnsupportedFormat = 6,
    /// The archive is damaged.
    CorruptedArchive = 7,
    /// The password is missing or wrong.
    WrongPassword = 8,
    /// A progress callback stopped the operation.
    Cancelled = 9,
    /// An item index is past the end.
    IndexOutOfRange = 10,
    /// The archive is already open.
    AlreadyOpen = 11,
    /// The archive is not open.
    NotOpen = 12,
    /// Writing failed.
    WriteError = 13,
    /// Reading failed.
    ReadError = 14,
    /// The operation is not available.
    NotImplemented = 15,
    /// The disk is full.
    DiskFull = 16,
}

impl SzResult {
    /// Fixed English description.
    pub const fn description(self) -> &'static CStr {
        match self {
            Self::Ok => c"Success",
            Self::Fail => c"General failure",
            Self::OutOfMemory => c"Out of memory",
            Self::FileNotFound => c"File not found",
            Self::AccessDenied => c"Access denied",
            Self::InvalidArgument => c"Invalid argument",
            Self::UnsupportedFormat => c"Unsupported format",
            Self::CorruptedArchive => c"Corrupted archive",
            Self::WrongPassword => c"Wrong password",
            Self::Cancelled => c"Operation cancelled",
            Self::IndexOutOfRange => c"Index out of range",
            Self::AlreadyOpen => c"Archive already open",
            Self::NotOpen => c"Archive not open",
            Self::WriteError => c"Write error",
            Self::ReadError => c"Read error",
            Self::NotImplemented => c"Feature not implemented",
            Self::DiskFull => c"Disk full",
        }
    }

    fn from_code(code: c_int) -> Option<Self> {
        const ALL: [SzResult; 17] = [
            SzResult::Ok,
            SzResult::Fail,
            SzResult::OutOfMemory,
            SzResult::FileNotFound,
            SzResult::AccessDenied,
            SzResult::InvalidArgument,
            SzResult::UnsupportedFormat,
            SzResult::CorruptedArchive,
            SzResult::WrongPassword,
            SzResult::Cancelled,
            SzResult::IndexOutOfRange,
            SzResult::AlreadyOpen,
            SzResult::NotOpen,
            SzResult::WriteError,
            SzResult::ReadError,
            SzResult::NotImplemented,
            SzResult::DiskFull,
        ];
        ALL.into_iter().find(|r| *r as c_int == code)
    }
}

impl From<&Error> for SzResult {
    fn from(error: &Error) -> Self {
        match error.code() {
            ErrorCode::OutOfMemory => Self::OutOfMemory,
            ErrorCode::FileNotFound | ErrorCode::PathNotFound => Self::FileNotFound,
            ErrorCode::AccessDenied => Self::AccessDenied,
            ErrorCode::InvalidArgument => Self::InvalidArgument,
            ErrorCode::InvalidArchive | ErrorCode::UnsupportedFormat => Self::UnsupportedFormat,
            ErrorCode::CorruptedArchive
            | ErrorCode::HeaderError
            | ErrorCode::DataError
            | ErrorCode::CrcError
            | ErrorCode::UnexpectedEnd
            | ErrorCode::DataAfterEnd => Self::CorruptedArchive,
            ErrorCode::WrongPassword | ErrorCode::EncryptedHeader => Self::WrongPassword,
            ErrorCode::OperationCancelled | ErrorCode::Aborted => Self::Cancelled,
            ErrorCode::ArchiveWriteError | ErrorCode::StreamWriteError => Self::WriteError,
            ErrorCode::CannotOpenFile
            | ErrorCode::StreamReadError
            | ErrorCode::StreamSeekError => Self::ReadError,
            ErrorCode::NotImplemented | ErrorCode::UnsupportedMethod => Self::NotImplemented,
            ErrorCode::DiskFull => Self::DiskFull,
            _ => Self::Fail,
        }
    }
}

/// Auto-detect; only meaningful when opening.
pub const SZ_FORMAT_AUTO: c_int = 0;
/// 7z.
pub const SZ_FORMAT_7Z: c_int = 1;
/// ZIP.
pub const SZ_FORMAT_ZIP: c_int = 2;
/// tar.
pub const SZ_FORMAT_TAR: c_int = 3;
/// gzip.
pub const SZ_FORMAT_GZIP: c_int = 4;
/// bzip2.
pub const SZ_FORMAT_BZIP2: c_int = 5;
/// xz.
pub const SZ_FORMAT_XZ: c_int = 6;

const FORMAT_CODES: [(c_int, ArchiveFormat); 7] = [
    (SZ_FORMAT_AUTO, ArchiveFormat::Unknown),
    (SZ_FORMAT_7Z, ArchiveFormat::SevenZip),
    (SZ_FORMAT_ZIP, ArchiveFormat::Zip),
    (SZ_FORMAT_TAR, ArchiveFormat::Tar),
    (SZ_FORMAT_GZIP, ArchiveFormat::GZip),
    (SZ_FORMAT_BZIP2, ArchiveFormat::BZip2),
    (SZ_FORMAT_XZ, ArchiveFormat::Xz),
];

fn format_from_code(code: c_int) -> Result<ArchiveFormat, Failure> {
    FORMAT_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, format)| *format)
        .ok_or_else(|| Failure::new(SzResult::InvalidArgument, format!("unknown format code {code}")))
}

fn format_to_code(format: ArchiveFormat) -> c_int {
    FORMAT_CODES
        .iter()
        .find(|(_, f)| *f == format)
        .map_or(-1, |(code, _)| *code)
}

fn level_from_code(level: c_int) -> Result<u32, Failure> {
    u32::try_from(level)
        .ok()
        .filter(|l| *l <= 9)
        .ok_or_else(|| {
            Failure::new(
                SzResult::InvalidArgument,
                format!("compression level must be 0-9, got {level}"),
            )
        })
}

/// Progress callback: return non-zero to continue, zero to cancel.
pub type SzProgressCallback =
    Option<unsafe extern "C" fn(completed: u64, total: u64, user_data: *mut c_void) -> c_int>;

/// Adapts a C progress callback.
struct ForeignProgress {
    callback: unsafe extern "C" fn(u64, u64, *mut c_void) -> c_int,
    user_data: *mut c_void,
}

// SAFETY: the callback runs synchronously on the thread that called into the
// library; the caller owns whatever `user_data` points to for that long.
unsafe impl Send for ForeignProgress {}

impl ProgressReporter for ForeignProgress {
    fn on_progress(&mut self, completed_bytes: u64, total_bytes: u64) -> bool {
        // SAFETY: the caller registered a valid function for this user data.
        unsafe { (self.callback)(completed_bytes, total_bytes, self.user_data) != 0 }
    }
}

fn foreign_progress(
    callback: SzProgressCallback,
    user_data: *mut c_void,
) -> Option<ForeignProgress> {
    callback.map(|callback| ForeignProgress {
        callback,
        user_data,
    })
}

/// An error on its way out through the C ABI.
#[derive(Debug)]
struct Failure {
    code: SzResult,
    message: String,
}

impl Failure {
    fn new(code: SzResult, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn null(what: &str) -> Self {
        Self::new(SzResult::InvalidArgument, format!("{what} must not be NULL"))
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::new(SzResult::from(&error), error.to_string())
    }
}

type FfiResult<T> = Result<T, Failure>;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: &str) {
    let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(text));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Runs the body of an exported function. Errors and panics become a
/// result code and the thread's last error message; success clears it.
fn call(name: &str, body: impl FnOnce() -> FfiResult<()>) -> SzResult {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => {
            clear_last_error();
            SzResult::Ok
        }
        Ok(Err(failure)) => {
            log::debug!("{name} failed: {}", failure.message);
            set_last_error(&failure.message);
            failure.code
        }
        Err(payload) => {
            let message = crate::engine::panic_message(payload.as_ref());
            log::error!("panic in {name}: {message}");
            set_last_error(&format!("internal error: {message}"));
            SzResult::Fail
        }
    }
}

/// Runs a release function, swallowing panics.
fn release(name: &str, body: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
        log::error!("panic in {name}: {}", crate::engine::panic_message(payload.as_ref()));
    }
}

/// Borrows a NUL-terminated UTF-8 argument.
///
/// # Safety
///
/// `ptr` is null or points to a NUL-terminated string that outlives `'a`.
unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(Failure::null(what));
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let text = unsafe { CStr::from_ptr(ptr) };
    text.to_str()
        .map_err(|_| Failure::new(SzResult::InvalidArgument, format!("{what} is not valid UTF-8")))
}

/// Like [`str_arg`], but null is `None`.
///
/// # Safety
///
/// Same as [`str_arg`].
unsafe fn opt_str_arg<'a>(ptr: *const c_char, what: &str) -> FfiResult<Option<&'a str>> {
    if ptr.is_null() {
        Ok(None)
    } else {
        // SAFETY: forwarded contract.
        unsafe { str_arg(ptr, what) }.map(Some)
    }
}

/// Borrows `size` bytes at `data`. A zero size accepts any pointer.
///
/// # Safety
///
/// For a non-zero `size`, `data` is null or valid for `size` bytes during `'a`.
unsafe fn bytes_arg<'a>(data: *const c_void, size: usize, what: &str) -> FfiResult<&'a [u8]> {
    if size == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(Failure::null(what));
    }
    // SAFETY: non-null and valid for `size` bytes per the caller's contract.
    Ok(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size) })
}

/// Borrows the object behind a handle.
///
/// # Safety
///
/// `ptr` is null or a live handle of type `T` not used elsewhere during `'a`.
unsafe fn handle_arg<'a, T>(ptr: *mut T, what: &str) -> FfiResult<&'a mut T> {
    // SAFETY: forwarded contract.
    unsafe { ptr.as_mut() }.ok_or_else(|| Failure::null(what))
}

fn check_out<T>(ptr: *mut T, what: &str) -> FfiResult<()> {
    if ptr.is_null() {
        Err(Failure::null(what))
    } else {
        Ok(())
    }
}

/// Writes through an output pointer already checked with [`check_out`].
///
/// # Safety
///
/// `ptr` is non-null, aligned and writable.
unsafe fn write_out<T>(ptr: *mut T, value: T) {
    // SAFETY: forwarded contract.
    unsafe { ptr.write(value) }
}

/// Bytes reserved in front of every returned buffer to remember its length.
const BUFFER_HEADER: usize = 16;

/// Copies `data` into a buffer released by [`sz_memory_free`].
fn alloc_buffer(data: &[u8]) -> FfiResult<*mut c_void> {
    let oom = || Failure::new(SzResult::OutOfMemory, format!("cannot allocate {} bytes", data.len()));
    let size = data.len().checked_add(BUFFER_HEADER).ok_or_else(oom)?;
    let layout = Layout::from_size_align(size, BUFFER_HEADER).map_err(|_| oom())?;
    // SAFETY: the layout has a non-zero size.
    let base = unsafe { alloc::alloc(layout) };
    if base.is_null() {
        return Err(oom());
    }
    // SAFETY: `base` holds `size` bytes aligned to 16, enough for the
    // length word followed by the payload.
    unsafe {
        base.cast::<usize>().write(data.len());
        let payload = base.add(BUFFER_HEADER);
        ptr::copy_nonoverlapping(data.as_ptr(), payload, data.len());
        Ok(payload.cast())
    }
}

/// Hands `data` to the caller through `out_data`/`out_size`.
///
/// # Safety
///
/// Both pointers were checked with [`check_out`].
unsafe fn return_buffer(
    data: &[u8],
    out_data: *mut *mut c_void,
    out_size: *mut usize,
) -> FfiResult<()> {
    let buffer = alloc_buffer(data)?;
    // SAFETY: forwarded contract.
    unsafe {
        write_out(out_data, buffer);
        write_out(out_size, data.len());
    }
    Ok(())
}

/// Releases a buffer returned by this library. Null is ignored.
///
/// # Safety
///
/// `data` is null or a buffer from this library not yet released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_memory_free(data: *mut c_void) {
    if data.is_null() {
        return;
    }
    // SAFETY: `data` came from `alloc_buffer`, so the length word sits
    // `BUFFER_HEADER` bytes before it and the layout can be rebuilt.
    unsafe {
        let base = data.cast::<u8>().sub(BUFFER_HEADER);
        let len = base.cast::<usize>().read();
        let layout = Layout::from_size_align_unchecked(len + BUFFER_HEADER, BUFFER_HEADER);
        alloc::dealloc(base, layout);
    }
}

/// Fixed description of a result code.
#[unsafe(no_mangle)]
pub extern "C" fn sz_error_to_string(error: c_int) -> *const c_char {
    SzResult::from_code(error)
        .map_or(c"Unknown error", SzResult::description)
        .as_ptr()
}

/// Message of the last failed call on this thread, or an empty string. The
/// pointer stays valid until the next call into the library on this thread.
#[unsafe(no_mangle)]
pub extern "C" fn sz_get_last_error_message() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(c"".as_ptr(), |message| message.as_ptr())
    })
}

/// Forgets the last error message of this thread.
#[unsafe(no_mangle)]
pub extern "C" fn sz_clear_error() {
    clear_last_error();
}

static VERSION: &CStr = match CStr::from_bytes_with_nul(concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes()) {
    Ok(version) => version,
    Err(_) => c"0.0.0",
};

/// Library version as `major.minor.patch`.
#[unsafe(no_mangle)]
pub extern "C" fn sz_version() -> *const c_char {
    VERSION.as_ptr()
}

/// Same as [`sz_version`].
#[unsafe(no_mangle)]
pub extern "C" fn sz_version_string() -> *const c_char {
    VERSION.as_ptr()
}

/// Library version as numbers. Null pointers are skipped.
///
/// # Safety
///
/// Each pointer is null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sz_version_number(
    major: *mut c_int,
    minor: *mut c_int,
    patch: *mut c_int,
) {
    let parse = |text: &str| text.parse::<c_int>().unwrap_or(0);
    let parts = [
        (major, parse(env!("CARGO_PKG_VERSION_MAJOR"))),
        (minor, parse(env!("CARGO_PKG_VERSION_MINOR"))),
        (patch, parse(env!("CARGO_PKG_VERSION_PATCH"))),
    ];
    for (ptr, value) in parts {
        if !ptr.is_null() {
            // SAFETY: non-null and writable per the caller's contract.
            unsafe { ptr.write(value) };
        }
    }
}

/// Returns 1 if archives of `format` can be opened and created, 0 if not.
/// `SZ_FORMAT_AUTO` counts as supported.
#[unsafe(no_mangle)]
pub extern "C" fn sz_is_format_supported(format: c_int) -> c_int {
    crate::engine::init();
    match format_from_code(format) {
        Ok(ArchiveFormat::Unknown) => 1,
        Ok(format) => c_int::from(crate::engine::has_handler(format)),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(ptr: *const c_char) -> String {
        unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string()
    }

    #[test]
    fn result_codes_are_stable() {
        assert_eq!(SzResult::Ok as c_int, 0);
        assert_eq!(SzResult::WrongPassword as c_int, 8);
        assert_eq!(SzResult::DiskFull as c_int, 16);
        assert_eq!(SzResult::from_code(10), Some(SzResult::IndexOutOfRange));
        assert_eq!(SzResult::from_code(17), None);
        assert_eq!(text(sz_error_to_string(9)), "Operation cancelled");
        assert_eq!(text(sz_error_to_string(99)), "Unknown error");
    }

    #[test]
    fn errors_map_to_results() {
        let cases = [
            (Error::Cancelled, SzResult::Cancelled),
            (Error::wrong_password(None, None), SzResult::WrongPassword),
            (Error::unsupported_format("x"), SzResult::UnsupportedFormat),
            (Error::data(ErrorCode::CrcError, 0, "bad"), SzResult::CorruptedArchive),
            (Error::InvalidState("done".into()), SzResult::Fail),
            (Error::not_supported("x"), SzResult::NotImplemented),
        ];
        for (error, expected) in cases {
            assert_eq!(SzResult::from(&error), expected, "{error}");
        }
    }

    #[test]
    fn last_error_is_per_call() {
        let result = call("test", || Err(Failure::null("thing")));
        assert_eq!(result, SzResult::InvalidArgument);
        assert_eq!(text(sz_get_last_error_message()), "thing must not be NULL");
        assert_eq!(call("test", || Ok(())), SzResult::Ok);
        assert_eq!(text(sz_get_last_error_message()), "");
    }

    #[test]
    fn panics_do_not_escape() {
        let result = call("test", || panic!("boom"));
        assert_eq!(result, SzResult::Fail);
        assert!(text(sz_get_last_error_message()).contains("boom"));
        sz_clear_error();
        assert_eq!(text(sz_get_last_error_message()), "");
    }

    #[test]
    fn buffers_round_trip() {
        let buffer = alloc_buffer(b"abc").unwrap();
        let view = unsafe { std::slice::from_raw_parts(buffer.cast::<u8>(), 3) };
        assert_eq!(view, b"abc");
        unsafe { sz_memory_free(buffer) };
        unsafe { sz_memory_free(ptr::null_mut()) };

        let empty = alloc_buffer(&[]).unwrap();
        assert!(!empty.is_null());
        unsafe { sz_memory_free(empty) };
    }

    #[test]
    fn version_and_formats() {
        assert_eq!(text(sz_version()), env!("CARGO_PKG_VERSION"));
        assert_eq!(sz_version(), sz_version_string());
        let (mut major, mut minor) = (-1, -1);
        unsafe { sz_version_number(&mut major, &mut minor, ptr::null_mut()) };
        assert!(major >= 0 && minor >= 0);

        assert_eq!(sz_is_format_supported(SZ_FORMAT_AUTO), 1);
        assert_eq!(sz_is_format_supported(SZ_FORMAT_7Z), 1);
        assert_eq!(sz_is_format_supported(42), 0);
        assert_eq!(format_to_code(ArchiveFormat::Zip), SZ_FORMAT_ZIP);
        assert_eq!(format_to_code(ArchiveFormat::Rar), -1);
    }

    #[test]
    fn levels_are_checked() {
        assert_eq!(level_from_code(9).unwrap(), 9);
        assert!(level_from_code(10).is_err());
        assert!(level_from_code(-1).is_err());
    }
}
