//! Engine status codes and per-item operation results.

use std::fmt;

use crate::error::Error;

/// HRESULT-compatible status code returned across engine callback boundaries.
///
/// Non-negative values are success; negative values are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineCode(pub i32);

#[allow(missing_docs)]
impl EngineCode {
    pub const S_OK: Self = Self(0);
    pub const S_FALSE: Self = Self(1);
    pub const E_NOTIMPL: Self = Self(0x8000_4001_u32 as i32);
    pub const E_POINTER: Self = Self(0x8000_4003_u32 as i32);
    pub const E_ABORT: Self = Self(0x8000_4004_u32 as i32);
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const E_UNEXPECTED: Self = Self(0x8000_FFFF_u32 as i32);
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    pub const FILE_NOT_FOUND: Self = Self(0x8007_0002_u32 as i32);
    pub const PATH_NOT_FOUND: Self = Self(0x8007_0003_u32 as i32);
    pub const ACCESS_DENIED: Self = Self(0x8007_0005_u32 as i32);
    pub const INVALID_HANDLE: Self = Self(0x8007_0006_u32 as i32);
    pub const INVALID_DATA: Self = Self(0x8007_000D_u32 as i32);
    pub const CRC_ERROR: Self = Self(0x8007_0017_u32 as i32);
    pub const SEEK_ERROR: Self = Self(0x8007_0019_u32 as i32);
    pub const WRITE_FAULT: Self = Self(0x8007_001D_u32 as i32);
    pub const READ_FAULT: Self = Self(0x8007_001E_u32 as i32);
    pub const HANDLE_EOF: Self = Self(0x8007_0026_u32 as i32);
    pub const NOT_SUPPORTED: Self = Self(0x8007_0032_u32 as i32);
    pub const FILE_EXISTS: Self = Self(0x8007_0050_u32 as i32);
    pub const INVALID_PASSWORD: Self = Self(0x8007_0056_u32 as i32);
    pub const OPEN_FAILED: Self = Self(0x8007_006E_u32 as i32);
    pub const DISK_FULL: Self = Self(0x8007_0070_u32 as i32);
    pub const NEGATIVE_SEEK: Self = Self(0x8007_0083_u32 as i32);
    pub const NOT_ARCHIVE: Self = Self(0x8007_00C1_u32 as i32);
}

impl EngineCode {
    /// Returns true for non-negative codes.
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Returns true for negative codes.
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Returns the code as an unsigned 32-bit value.
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for EngineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl From<&Error> for EngineCode {
    fn from(error: &Error) -> Self {
        error.to_engine_code()
    }
}

/// Failure reported by an engine call: a status code plus the message the
/// engine produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Status code.
    pub code: EngineCode,
    /// Message text, possibly empty.
    pub message: String,
}

impl EngineFailure {
    /// Creates a failure.
    pub fn new(code: EngineCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A failure carrying only a code.
    pub fn code(code: EngineCode) -> Self {
        Self::new(code, String::new())
    }

    /// Prefixes the message with `context`.
    pub fn with_context(mut self, context: &str) -> Self {
        self.message = if self.message.is_empty() {
            context.to_string()
        } else {
            format!("{context}: {}", self.message)
        };
        self
    }

    /// Converts to the public error type, prefixing `context`.
    pub fn into_error(self, context: &str) -> Error {
        Error::from_engine(self.code, &self.message, context)
    }
}

impl From<EngineCode> for EngineFailure {
    fn from(code: EngineCode) -> Self {
        Self::code(code)
    }
}

impl From<Error> for EngineFailure {
    fn from(error: Error) -> Self {
        Self::new(error.to_engine_code(), error.to_string())
    }
}

impl From<std::io::Error> for EngineFailure {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error).into()
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "engine failure {}", self.code)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

/// Result type used by engine entry points.
pub type EngineResult<T> = std::result::Result<T, EngineFailure>;

/// Outcome of one item in an extract or update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationResult {
    /// Item processed successfully.
    Ok,
    /// The item uses a method the engine cannot decode.
    UnsupportedMethod,
    /// The item data could not be decoded.
    DataError,
    /// Decoded data failed its checksum.
    CrcError,
    /// The item data is not available.
    Unavailable,
    /// The data ended early.
    UnexpectedEnd,
    /// Extra data follows the item.
    DataAfterEnd,
    /// The input is not an archive.
    IsNotArc,
    /// The headers are damaged.
    HeadersError,
    /// The password is wrong.
    WrongPassword,
}

impl OperationResult {
    /// Returns true for [`OperationResult::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Maps to the error code used when surfacing the result.
    pub fn error_code(self) -> Option<crate::ErrorCode> {
        use crate::ErrorCode;
        Some(match self {
            Self::Ok => return None,
            Self::UnsupportedMethod => ErrorCode::UnsupportedMethod,
            Self::DataError => ErrorCode::DataError,
            Self::CrcError => ErrorCode::CrcError,
            Self::Unavailable => ErrorCode::Unavailable,
            Self::UnexpectedEnd => ErrorCode::UnexpectedEnd,
            Self::DataAfterEnd => ErrorCode::DataAfterEnd,
            Self::IsNotArc => ErrorCode::InvalidArchive,
            Self::HeadersError => ErrorCode::HeaderError,
            Self::WrongPassword => ErrorCode::WrongPassword,
        })
    }

    /// Classifies a decode failure of one item.
    ///
    /// Data and checksum failures on encrypted items are reported as
    /// [`OperationResult::WrongPassword`].
    pub fn from_failure(failure: &EngineFailure, encrypted: bool) -> Self {
        use crate::ErrorCode;
        let result = match crate::ErrorCode::classify(failure.code, &failure.message) {
            ErrorCode::CrcError => Self::CrcError,
            ErrorCode::UnexpectedEnd => Self::UnexpectedEnd,
            ErrorCode::UnsupportedMethod | ErrorCode::NotImplemented => Self::UnsupportedMethod,
            ErrorCode::WrongPassword | ErrorCode::EncryptedHeader => Self::WrongPassword,
            ErrorCode::Unavailable => Self::Unavailable,
            ErrorCode::DataAfterEnd => Self::DataAfterEnd,
            ErrorCode::HeaderError => Self::HeadersError,
            ErrorCode::InvalidArchive => Self::IsNotArc,
            _ => Self::DataError,
        };
        match result {
            Self::DataError | Self::CrcError | Self::UnexpectedEnd if encrypted => {
                Self::WrongPassword
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn success_and_failure() {
        assert!(EngineCode::S_OK.is_success());
        assert!(EngineCode::S_FALSE.is_success());
        assert!(EngineCode::E_ABORT.is_failure());
        assert_eq!(EngineCode::E_FAIL.as_u32(), 0x8000_4005);
        assert_eq!(EngineCode::E_FAIL.to_string(), "0x80004005");
    }

    #[test]
    fn encrypted_crc_failure_is_wrong_password() {
        let failure = EngineFailure::new(EngineCode::CRC_ERROR, "");
        assert_eq!(
            OperationResult::from_failure(&failure, true),
            OperationResult::WrongPassword
        );
        assert_eq!(
            OperationResult::from_failure(&failure, false),
            OperationResult::CrcError
        );
    }

    #[test]
    fn operation_result_codes() {
        assert_eq!(OperationResult::Ok.error_code(), None);
        assert_eq!(
            OperationResult::HeadersError.error_code(),
            Some(ErrorCode::HeaderError)
        );
    }

    #[test]
    fn failure_from_error_keeps_code() {
        let failure: EngineFailure = Error::Cancelled.into();
        assert_eq!(failure.code, EngineCode::E_ABORT);
        assert!(failure.into_error("extract").is_cancelled());
    }
}
