//! Error types for archive operations.
//!
//! This module provides the [`Error`] enum which represents every failure mode
//! surfaced by the reader, the writer, the compressor and the C ABI, together
//! with the finer-grained [`ErrorCode`] taxonomy and its [`ErrorKind`] grouping.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`:
//!
//! ```rust,no_run
//! use szbridge::{ArchiveReader, Result};
//!
//! fn extract_archive(path: &str, dest: &str) -> Result<()> {
//!     let mut reader = ArchiveReader::open(path)?;
//!     reader.extract_all(dest)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Matching on categories
//!
//! Every error carries an [`ErrorCode`]; codes are grouped into the
//! categories of [`ErrorKind`] so callers can react to a whole family:
//!
//! ```rust
//! use szbridge::{Error, ErrorKind};
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error.kind() {
//!         ErrorKind::FileSystem | ErrorKind::Stream => "file error",
//!         ErrorKind::Format => "not a readable archive",
//!         ErrorKind::Data => "archive data is damaged",
//!         ErrorKind::Password => "password problem",
//!         ErrorKind::NotSupported => "not supported",
//!         _ => "archive operation failed",
//!     }
//! }
//! ```

use std::fmt;
use std::io;

use crate::engine::EngineCode;

/// Broad category of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Missing files, permissions, full disks.
    FileSystem,
    /// The input is not an archive, or its structure is invalid.
    Format,
    /// Item payload failed integrity checks.
    Data,
    /// Missing or incorrect password, or encrypted headers.
    Password,
    /// State and flow problems: cancellation, invalid state, write failure.
    Operation,
    /// Low-level stream read, write or seek failure.
    Stream,
    /// Operation or method is not implemented for this format.
    NotSupported,
    /// Argument, memory and uncategorized failures.
    Other,
}

/// Fine-grained error code.
///
/// The set mirrors the codes exposed through the C ABI and the codes the
/// engine mapping can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Failure that could not be classified.
    Unknown,
    /// Requested functionality is not implemented.
    NotImplemented,
    /// An argument was out of range or malformed.
    InvalidArgument,
    /// An allocation failed.
    OutOfMemory,
    /// A file does not exist.
    FileNotFound,
    /// A directory component of a path does not exist.
    PathNotFound,
    /// The operating system refused access.
    AccessDenied,
    /// The target file already exists.
    FileExists,
    /// No space left on the target device.
    DiskFull,
    /// A handle was closed or never opened.
    InvalidHandle,
    /// The input is not a valid archive.
    InvalidArchive,
    /// The archive format is recognized but cannot be processed.
    UnsupportedFormat,
    /// The archive structure is damaged.
    CorruptedArchive,
    /// The archive headers could not be decoded.
    HeaderError,
    /// Item data could not be decoded.
    DataError,
    /// Item data decoded but its checksum does not match.
    CrcError,
    /// The data ended before the item was complete.
    UnexpectedEnd,
    /// Extra bytes follow the end of the archive data.
    DataAfterEnd,
    /// The password is missing or incorrect.
    WrongPassword,
    /// The headers are encrypted and no password was supplied.
    EncryptedHeader,
    /// The progress callback requested cancellation.
    OperationCancelled,
    /// The compression method is not supported.
    UnsupportedMethod,
    /// The item data is not available (for example a missing volume).
    Unavailable,
    /// The engine aborted the operation.
    Aborted,
    /// The object is in the wrong state for the request.
    InvalidState,
    /// Writing the archive failed.
    ArchiveWriteError,
    /// A file could not be opened or created.
    CannotOpenFile,
    /// Reading from a stream failed.
    StreamReadError,
    /// Writing to a stream failed.
    StreamWriteError,
    /// Seeking within a stream failed.
    StreamSeekError,
}

impl ErrorCode {
    /// Returns the category this code belongs to.
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::FileNotFound
            | Self::PathNotFound
            | Self::AccessDenied
            | Self::FileExists
            | Self::DiskFull
            | Self::CannotOpenFile => ErrorKind::FileSystem,
            Self::InvalidArchive
            | Self::UnsupportedFormat
            | Self::CorruptedArchive
            | Self::HeaderError => ErrorKind::Format,
            Self::DataError | Self::CrcError | Self::UnexpectedEnd | Self::DataAfterEnd => {
                ErrorKind::Data
            }
            Self::WrongPassword | Self::EncryptedHeader => ErrorKind::Password,
            Self::OperationCancelled
            | Self::Aborted
            | Self::InvalidState
            | Self::ArchiveWriteError
            | Self::Unavailable => ErrorKind::Operation,
            Self::StreamReadError | Self::StreamWriteError | Self::StreamSeekError => {
                ErrorKind::Stream
            }
            Self::NotImplemented | Self::UnsupportedMethod => ErrorKind::NotSupported,
            Self::Unknown | Self::InvalidArgument | Self::OutOfMemory | Self::InvalidHandle => {
                ErrorKind::Other
            }
        }
    }

    /// Returns a short human-readable description of the code.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Unknown => "unknown error",
            Self::NotImplemented => "not implemented",
            Self::InvalidArgument => "invalid argument",
            Self::OutOfMemory => "out of memory",
            Self::FileNotFound => "file not found",
            Self::PathNotFound => "path not found",
            Self::AccessDenied => "access denied",
            Self::FileExists => "file already exists",
            Self::DiskFull => "disk full",
            Self::InvalidHandle => "invalid handle",
            Self::InvalidArchive => "invalid archive",
            Self::UnsupportedFormat => "unsupported archive format",
            Self::CorruptedArchive => "corrupted archive",
            Self::HeaderError => "archive header error",
            Self::DataError => "data error",
            Self::CrcError => "CRC mismatch",
            Self::UnexpectedEnd => "unexpected end of data",
            Self::DataAfterEnd => "data after end of archive",
            Self::WrongPassword => "wrong password",
            Self::EncryptedHeader => "archive headers are encrypted",
            Self::OperationCancelled => "operation cancelled",
            Self::UnsupportedMethod => "unsupported compression method",
            Self::Unavailable => "data unavailable",
            Self::Aborted => "operation aborted",
            Self::InvalidState => "invalid state",
            Self::ArchiveWriteError => "archive write error",
            Self::CannotOpenFile => "cannot open file",
            Self::StreamReadError => "stream read error",
            Self::StreamWriteError => "stream write error",
            Self::StreamSeekError => "stream seek error",
        }
    }

    /// Maps an engine status code to an error code using the fixed table.
    ///
    /// Success codes and codes missing from the table map to
    /// [`ErrorCode::Unknown`]; use [`ErrorCode::classify`] to refine generic
    /// failures with the accompanying message.
    pub fn from_engine(code: EngineCode) -> Self {
        ENGINE_CODE_TABLE
            .iter()
            .find(|(engine, _)| *engine == code)
            .map(|(_, mapped)| *mapped)
            .unwrap_or(Self::Unknown)
    }

    /// Maps an engine status code and its message to an error code.
    ///
    /// Table entries win, except for generic failure codes where the message
    /// text is inspected for a more specific condition.
    pub fn classify(code: EngineCode, message: &str) -> Self {
        let mapped = Self::from_engine(code);
        match mapped {
            Self::Unknown | Self::DataError => {
                Self::from_message(message).unwrap_or(mapped)
            }
            _ => mapped,
        }
    }

    /// Inspects message text for a recognizable condition.
    pub fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_ascii_lowercase();
        MESSAGE_HINTS
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
            .map(|(_, code)| *code)
    }

    /// Returns the engine status code that represents this error code.
    pub fn to_engine(self) -> EngineCode {
        ENGINE_CODE_TABLE
            .iter()
            .find(|(_, mapped)| *mapped == self)
            .map(|(engine, _)| *engine)
            .unwrap_or(EngineCode::E_FAIL)
    }

    fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::FileNotFound,
            io::ErrorKind::PermissionDenied => Self::AccessDenied,
            io::ErrorKind::AlreadyExists => Self::FileExists,
            io::ErrorKind::UnexpectedEof => Self::UnexpectedEnd,
            io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            io::ErrorKind::InvalidInput => Self::InvalidArgument,
            io::ErrorKind::InvalidData => Self::DataError,
            io::ErrorKind::StorageFull => Self::DiskFull,
            io::ErrorKind::NotADirectory => Self::PathNotFound,
            io::ErrorKind::WriteZero => Self::StreamWriteError,
            io::ErrorKind::Interrupted => Self::Aborted,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Engine status to error code lookup table. Order matters for the reverse
/// lookup: the first entry for an error code is its canonical engine code.
const ENGINE_CODE_TABLE: &[(EngineCode, ErrorCode)] = &[
    (EngineCode::E_NOTIMPL, ErrorCode::NotImplemented),
    (EngineCode::E_INVALIDARG, ErrorCode::InvalidArgument),
    (EngineCode::E_POINTER, ErrorCode::InvalidArgument),
    (EngineCode::E_OUTOFMEMORY, ErrorCode::OutOfMemory),
    (EngineCode::E_ABORT, ErrorCode::OperationCancelled),
    (EngineCode::E_FAIL, ErrorCode::Unknown),
    (EngineCode::E_UNEXPECTED, ErrorCode::Unknown),
    (EngineCode::FILE_NOT_FOUND, ErrorCode::FileNotFound),
    (EngineCode::PATH_NOT_FOUND, ErrorCode::PathNotFound),
    (EngineCode::ACCESS_DENIED, ErrorCode::AccessDenied),
    (EngineCode::INVALID_HANDLE, ErrorCode::InvalidHandle),
    (EngineCode::FILE_EXISTS, ErrorCode::FileExists),
    (EngineCode::DISK_FULL, ErrorCode::DiskFull),
    (EngineCode::NEGATIVE_SEEK, ErrorCode::StreamSeekError),
    (EngineCode::SEEK_ERROR, ErrorCode::StreamSeekError),
    (EngineCode::READ_FAULT, ErrorCode::StreamReadError),
    (EngineCode::WRITE_FAULT, ErrorCode::StreamWriteError),
    (EngineCode::OPEN_FAILED, ErrorCode::CannotOpenFile),
    (EngineCode::CRC_ERROR, ErrorCode::CrcError),
    (EngineCode::INVALID_DATA, ErrorCode::DataError),
    (EngineCode::HANDLE_EOF, ErrorCode::UnexpectedEnd),
    (EngineCode::INVALID_PASSWORD, ErrorCode::WrongPassword),
    (EngineCode::NOT_SUPPORTED, ErrorCode::UnsupportedMethod),
    (EngineCode::NOT_ARCHIVE, ErrorCode::InvalidArchive),
];

/// Message fragments recognized when the engine only reports a generic code.
const MESSAGE_HINTS: &[(&[&str], ErrorCode)] = &[
    (&["headers are encrypted", "encrypted header"], ErrorCode::EncryptedHeader),
    (&["password"], ErrorCode::WrongPassword),
    (&["crc", "checksum"], ErrorCode::CrcError),
    (&["not found", "no such file"], ErrorCode::FileNotFound),
    (&["permission denied", "access denied", "access is denied"], ErrorCode::AccessDenied),
    (&["unexpected end", "unexpected eof", "failed to fill whole buffer"], ErrorCode::UnexpectedEnd),
    (&["no space", "disk full"], ErrorCode::DiskFull),
    (&["unsupported method", "unsupported compression"], ErrorCode::UnsupportedMethod),
    (&["bad signature", "invalid archive", "not an archive", "invalid zip archive"], ErrorCode::InvalidArchive),
    (&["header"], ErrorCode::HeaderError),
    (&["corrupt"], ErrorCode::CorruptedArchive),
    (&["out of memory"], ErrorCode::OutOfMemory),
];

/// The error type for archive operations.
///
/// Each variant belongs to one [`ErrorKind`]; [`Error::code`] yields the
/// precise [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error from the filesystem or an underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File-system condition reported with a specific code.
    #[error("{message}")]
    FileSystem {
        /// The precise code.
        code: ErrorCode,
        /// Human-readable description including the path involved.
        message: String,
    },

    /// The input is not an archive, uses an unsupported format, or its
    /// structure is damaged.
    #[error("{message}")]
    Format {
        /// The precise code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },

    /// Item data failed to decode or verify.
    #[error("{message}")]
    Data {
        /// The precise code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Index of the failing item, when known.
        entry_index: Option<usize>,
    },

    /// The password is missing or incorrect.
    ///
    /// Reported when an encrypted item fails to decode or verify, which is
    /// how a wrong password manifests.
    #[error("wrong password{}", entry_name.as_ref().map(|n| format!(" for '{n}'")).unwrap_or_default())]
    WrongPassword {
        /// Index of the item that failed, when known.
        entry_index: Option<usize>,
        /// Path of the item that failed, when known.
        entry_name: Option<String>,
    },

    /// The archive headers are encrypted and no password was given.
    #[error("archive headers are encrypted; a password is required")]
    EncryptedHeader,

    /// The operation or method is not supported for this format.
    #[error("not supported: {message}")]
    NotSupported {
        /// The precise code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },

    /// The progress callback requested cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// The reader or writer is in the wrong state for the request.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An argument was out of range or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An item path would escape the extraction directory.
    #[error("unsafe path in item {entry_index}: {path}")]
    PathTraversal {
        /// Index of the offending item.
        entry_index: usize,
        /// The path stored in the archive.
        path: String,
    },

    /// Any other condition, identified by its code.
    #[error("{message}")]
    Other {
        /// The precise code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds the variant matching `code`'s category.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ErrorCode::WrongPassword => Self::WrongPassword {
                entry_index: None,
                entry_name: None,
            },
            ErrorCode::EncryptedHeader => Self::EncryptedHeader,
            ErrorCode::OperationCancelled => Self::Cancelled,
            ErrorCode::InvalidState => Self::InvalidState(message),
            ErrorCode::InvalidArgument => Self::InvalidArgument(message),
            _ => match code.kind() {
                ErrorKind::FileSystem => Self::FileSystem { code, message },
                ErrorKind::Format => Self::Format { code, message },
                ErrorKind::Data => Self::Data {
                    code,
                    message,
                    entry_index: None,
                },
                ErrorKind::NotSupported => Self::NotSupported { code, message },
                _ => Self::Other { code, message },
            },
        }
    }

    /// Translates an engine failure into the error taxonomy.
    ///
    /// `context` is prepended to the engine message when non-empty.
    pub fn from_engine(code: EngineCode, message: &str, context: &str) -> Self {
        let mapped = ErrorCode::classify(code, message);
        let text = match (context.is_empty(), message.is_empty()) {
            (true, true) => mapped.description().to_string(),
            (true, false) => message.to_string(),
            (false, true) => format!("{context}: {}", mapped.description()),
            (false, false) => format!("{context}: {message}"),
        };
        Self::new(mapped, text)
    }

    /// Wraps an I/O failure on `path`, keeping the path in the message.
    ///
    /// Failures without a more specific code become
    /// [`ErrorCode::CannotOpenFile`].
    pub fn io_at(error: io::Error, path: &std::path::Path) -> Self {
        let code = match ErrorCode::from_io_kind(error.kind()) {
            ErrorCode::Unknown => ErrorCode::CannotOpenFile,
            code => code,
        };
        let message = format!("{}: {error}", path.display());
        match code.kind() {
            ErrorKind::FileSystem => Self::FileSystem { code, message },
            _ => Self::new(code, message),
        }
    }

    /// Creates a wrong-password error for an item.
    pub fn wrong_password(entry_index: Option<usize>, entry_name: Option<String>) -> Self {
        Self::WrongPassword {
            entry_index,
            entry_name,
        }
    }

    /// Creates a data error for an item.
    pub fn data(code: ErrorCode, entry_index: usize, message: impl Into<String>) -> Self {
        Self::Data {
            code,
            message: message.into(),
            entry_index: Some(entry_index),
        }
    }

    /// Creates an unsupported-format error.
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::Format {
            code: ErrorCode::UnsupportedFormat,
            message: message.into(),
        }
    }

    /// Creates a not-supported error for an operation or method.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            code: ErrorCode::NotImplemented,
            message: message.into(),
        }
    }

    /// Returns the precise error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(e) => ErrorCode::from_io_kind(e.kind()),
            Self::FileSystem { code, .. }
            | Self::Format { code, .. }
            | Self::Data { code, .. }
            | Self::NotSupported { code, .. }
            | Self::Other { code, .. } => *code,
            Self::WrongPassword { .. } => ErrorCode::WrongPassword,
            Self::EncryptedHeader => ErrorCode::EncryptedHeader,
            Self::Cancelled => ErrorCode::OperationCancelled,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::PathTraversal { .. } => ErrorCode::AccessDenied,
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::FileSystem,
            _ => self.code().kind(),
        }
    }

    /// Returns true for file-system and stream failures.
    pub fn is_io(&self) -> bool {
        matches!(self.kind(), ErrorKind::FileSystem | ErrorKind::Stream)
    }

    /// Returns true when the input is not a usable archive.
    pub fn is_format(&self) -> bool {
        self.kind() == ErrorKind::Format
    }

    /// Returns true when item data is corrupt or fails its checksum.
    pub fn is_data(&self) -> bool {
        self.kind() == ErrorKind::Data
    }

    /// Returns true for missing or incorrect passwords.
    pub fn is_password(&self) -> bool {
        self.kind() == ErrorKind::Password
    }

    /// Returns true when the format or method is not supported.
    pub fn is_not_supported(&self) -> bool {
        self.kind() == ErrorKind::NotSupported
            || self.code() == ErrorCode::UnsupportedFormat
    }

    /// Returns true if the operation was cancelled via the progress callback.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the item index associated with the error, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Self::Data { entry_index, .. } | Self::WrongPassword { entry_index, .. } => {
                *entry_index
            }
            Self::PathTraversal { entry_index, .. } => Some(*entry_index),
            _ => None,
        }
    }

    /// Returns the engine status code to report across a callback boundary.
    pub fn to_engine_code(&self) -> EngineCode {
        match self {
            Self::Io(e) if e.kind() == io::ErrorKind::Other => EngineCode::E_FAIL,
            _ => self.code().to_engine(),
        }
    }

    /// Attaches an item index to data and password errors that lack one.
    pub(crate) fn with_entry(self, index: usize, name: &str) -> Self {
        match self {
            Self::Data {
                code,
                message,
                entry_index: None,
            } => Self::Data {
                code,
                message: format!("{name}: {message}"),
                entry_index: Some(index),
            },
            Self::WrongPassword {
                entry_index: None, ..
            } => Self::WrongPassword {
                entry_index: Some(index),
                entry_name: Some(name.to_string()),
            },
            other => other,
        }
    }
}
