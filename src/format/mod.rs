//! Archive formats, detection and capabilities.
//!
//! [`ArchiveFormat`] names every container or compression format the crate
//! can recognize. Detection lives in [`detect`]; the static capability table
//! lives in [`info`].

pub mod detect;
pub mod info;

use std::fmt;
use std::str::FromStr;

use crate::Error;

pub use detect::{detect_format, detect_format_from_bytes, guess_format_from_extension};
pub use info::FormatInfo;

/// Archive or single-stream compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArchiveFormat {
    /// Not recognized.
    #[default]
    Unknown,
    /// 7z archive.
    SevenZip,
    /// ZIP archive.
    Zip,
    /// gzip stream.
    GZip,
    /// bzip2 stream.
    BZip2,
    /// tar archive.
    Tar,
    /// xz stream.
    Xz,
    /// Raw `.lzma` (LZMA-alone) stream.
    Lzma,
    /// RAR archive, versions 1.5 to 4.
    Rar,
    /// RAR5 archive.
    Rar5,
    /// ISO 9660 image.
    Iso,
    /// Windows imaging format.
    Wim,
    /// Microsoft cabinet.
    Cab,
    /// ARJ archive.
    Arj,
    /// cpio archive.
    Cpio,
    /// Debian package.
    Deb,
    /// Apple disk image.
    Dmg,
    /// HFS/HFS+ volume.
    Hfs,
    /// LHA/LZH archive.
    Lzh,
    /// NSIS installer.
    Nsis,
    /// RPM package.
    Rpm,
    /// UDF image.
    Udf,
    /// Virtual hard disk.
    Vhd,
    /// XAR archive.
    Xar,
    /// Unix `compress` stream.
    Z,
}

impl ArchiveFormat {
    /// Every format, `Unknown` excluded.
    pub const ALL: [ArchiveFormat; 24] = [
        Self::SevenZip,
        Self::Zip,
        Self::GZip,
        Self::BZip2,
        Self::Tar,
        Self::Xz,
        Self::Lzma,
        Self::Rar,
        Self::Rar5,
        Self::Iso,
        Self::Wim,
        Self::Cab,
        Self::Arj,
        Self::Cpio,
        Self::Deb,
        Self::Dmg,
        Self::Hfs,
        Self::Lzh,
        Self::Nsis,
        Self::Rpm,
        Self::Udf,
        Self::Vhd,
        Self::Xar,
        Self::Z,
    ];

    /// Short lowercase name, e.g. `"7z"` or `"gzip"`.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Primary file extension without the dot; empty for `Unknown`.
    pub fn extension(self) -> &'static str {
        self.info().extensions.first().copied().unwrap_or("")
    }

    /// Static capability descriptor.
    pub fn info(self) -> &'static FormatInfo {
        FormatInfo::of(self)
    }

    /// Looks a format up by name or extension, ignoring case.
    ///
    /// Accepts the short name (`"7z"`, `"gzip"`), common aliases
    /// (`"sevenzip"`, `"gz"`) and any extension listed in [`FormatInfo`].
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().trim_start_matches('.').to_ascii_lowercase();
        let alias = match lower.as_str() {
            "sevenzip" | "7-zip" | "7zip" => Some(Self::SevenZip),
            "bz" => Some(Self::BZip2),
            "lzma86" | "lzma-alone" => Some(Self::Lzma),
            "rar4" => Some(Self::Rar),
            "lha" => Some(Self::Lzh),
            "compress" => Some(Self::Z),
            _ => None,
        };
        alias.or_else(|| {
            Self::ALL.into_iter().find(|format| {
                let info = format.info();
                info.name == lower || info.extensions.contains(&lower.as_str())
            })
        })
    }

    /// True for formats that hold exactly one compressed stream.
    pub fn is_single_stream(self) -> bool {
        matches!(
            self,
            Self::GZip | Self::BZip2 | Self::Xz | Self::Lzma | Self::Z
        )
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| Error::unsupported_format(format!("unknown format name '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_extensions() {
        assert_eq!(ArchiveFormat::SevenZip.name(), "7z");
        assert_eq!(ArchiveFormat::SevenZip.extension(), "7z");
        assert_eq!(ArchiveFormat::GZip.extension(), "gz");
        assert_eq!(ArchiveFormat::BZip2.to_string(), "bzip2");
        assert_eq!(ArchiveFormat::Unknown.extension(), "");
    }

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(ArchiveFormat::from_name("7Z"), Some(ArchiveFormat::SevenZip));
        assert_eq!(ArchiveFormat::from_name("SevenZip"), Some(ArchiveFormat::SevenZip));
        assert_eq!(ArchiveFormat::from_name("GZ"), Some(ArchiveFormat::GZip));
        assert_eq!(ArchiveFormat::from_name(".tar"), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_name("lha"), Some(ArchiveFormat::Lzh));
        assert_eq!(ArchiveFormat::from_name("nope"), None);
        assert!("zip".parse::<ArchiveFormat>().is_ok());
        assert!("nope".parse::<ArchiveFormat>().unwrap_err().is_not_supported());
    }

    #[test]
    fn every_format_has_info() {
        for format in ArchiveFormat::ALL {
            assert_eq!(format.info().format, format);
            assert!(!format.name().is_empty());
        }
    }
}
