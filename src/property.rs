//! Typed property values exchanged with the engine.
//!
//! Item and archive metadata travel between the orchestrators and the format
//! handlers as `(PropId, PropValue)` pairs. [`PropValue`] is a closed sum type;
//! consumers read it through the typed accessors, which return `None` when the
//! value is unset or of a different type.

use std::fmt;

use crate::Timestamp;

/// Identifies an item or archive property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PropId {
    /// Item path, forward-slash separated.
    Path,
    /// Item is a directory.
    IsDir,
    /// Uncompressed size.
    Size,
    /// Packed size.
    PackSize,
    /// Attribute bits.
    Attrib,
    /// Creation time.
    CTime,
    /// Last access time.
    ATime,
    /// Last modification time.
    MTime,
    /// CRC-32 of the item data.
    Crc,
    /// Item data is encrypted.
    Encrypted,
    /// Comment text.
    Comment,
    /// Archive uses solid compression.
    Solid,
    /// Archive spans several volumes.
    IsVolume,
    /// Physical size of the archive.
    PhySize,
    /// Number of volumes.
    NumVolumes,
    /// Archive headers are encrypted.
    HeadersEncrypted,
    /// Compression method description.
    Method,
    /// Target of a symbolic link item.
    SymLink,
    /// Target of a hard link item.
    HardLink,
}

/// A generic property value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropValue {
    /// No value.
    #[default]
    Empty,
    /// Boolean flag.
    Bool(bool),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// Text.
    Str(String),
    /// Point in time.
    Time(Timestamp),
}

impl PropValue {
    /// Returns true for [`PropValue::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unsigned value, widening 32-bit integers.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            Self::U32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    /// 32-bit value; 64-bit integers convert when they fit.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            Self::U64(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Time value.
    pub fn as_time(&self) -> Option<Timestamp> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u32> for PropValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<u64> for PropValue {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Timestamp> for PropValue {
    fn from(v: Timestamp) -> Self {
        Self::Time(v)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Empty, Into::into)
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{}", if *b { "+" } else { "-" }),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Time(t) => write!(f, "{}", t.as_unix_secs()),
        }
    }
}

/// File attribute bits.
///
/// The low word holds Windows attributes. When [`attributes::UNIX_EXTENSION`]
/// is set, the high 16 bits hold a POSIX mode.
pub mod attributes {
    /// Read-only file.
    pub const READONLY: u32 = 0x01;
    /// Hidden file.
    pub const HIDDEN: u32 = 0x02;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Archive bit.
    pub const ARCHIVE: u32 = 0x20;
    /// No other attributes set.
    pub const NORMAL: u32 = 0x80;
    /// High word carries a POSIX mode.
    pub const UNIX_EXTENSION: u32 = 0x8000;

    /// Combines Windows bits with a POSIX mode.
    pub const fn with_unix_mode(windows: u32, mode: u32) -> u32 {
        (windows & 0xFFFF) | UNIX_EXTENSION | ((mode & 0xFFFF) << 16)
    }

    /// Extracts the POSIX mode when present.
    pub const fn unix_mode(attrib: u32) -> Option<u32> {
        if attrib & UNIX_EXTENSION != 0 {
            Some(attrib >> 16)
        } else {
            None
        }
    }

    /// Returns true if the directory bit or a POSIX directory mode is set.
    pub const fn is_directory(attrib: u32) -> bool {
        if attrib & DIRECTORY != 0 {
            return true;
        }
        match unix_mode(attrib) {
            Some(mode) => mode & 0o170000 == 0o040000,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        assert_eq!(PropValue::U32(7).as_u64(), Some(7));
        assert_eq!(PropValue::U64(1 << 40).as_u32(), None);
        assert_eq!(PropValue::Str("a".into()).as_bool(), None);
        assert_eq!(PropValue::Empty.as_str(), None);
        assert!(PropValue::from(None::<u64>).is_empty());
        assert_eq!(PropValue::from(Some(true)), PropValue::Bool(true));
    }

    #[test]
    fn display_format() {
        assert_eq!(PropValue::Bool(true).to_string(), "+");
        assert_eq!(PropValue::from("LZMA2").to_string(), "LZMA2");
        assert_eq!(PropValue::U32(9).to_string(), "9");
    }

    #[test]
    fn attribute_bits() {
        let attrib = attributes::with_unix_mode(attributes::ARCHIVE, 0o100644);
        assert_eq!(attributes::unix_mode(attrib), Some(0o100644));
        assert!(!attributes::is_directory(attrib));
        assert!(attributes::is_directory(attributes::DIRECTORY));
        let dir = attributes::with_unix_mode(0, 0o040755);
        assert!(attributes::is_directory(dir));
        assert_eq!(attributes::unix_mode(attributes::NORMAL), None);
    }
}
