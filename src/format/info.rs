//! Static per-format capability table.

use super::ArchiveFormat;

/// Capabilities of one format as supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// The described format.
    pub format: ArchiveFormat,
    /// Short lowercase name.
    pub name: &'static str,
    /// Recognized extensions without the dot; the first is the primary one.
    pub extensions: &'static [&'static str],
    /// Archives of this format can be opened and extracted.
    pub can_read: bool,
    /// Archives of this format can be created.
    pub can_write: bool,
    /// Item data can be encrypted.
    pub supports_encryption: bool,
    /// Items can share one compressed block.
    pub supports_solid: bool,
    /// Output can be split into volumes.
    pub supports_multi_volume: bool,
    /// One-line description.
    pub description: &'static str,
}

#[allow(clippy::too_many_arguments)]
const fn entry(
    format: ArchiveFormat,
    name: &'static str,
    extensions: &'static [&'static str],
    rw: (bool, bool),
    encryption: bool,
    solid: bool,
    multi_volume: bool,
    description: &'static str,
) -> FormatInfo {
    FormatInfo {
        format,
        name,
        extensions,
        can_read: rw.0,
        can_write: rw.1,
        supports_encryption: encryption,
        supports_solid: solid,
        supports_multi_volume: multi_volume,
        description,
    }
}

const READ_WRITE: (bool, bool) = (true, true);
const DETECT_ONLY: (bool, bool) = (false, false);

#[rustfmt::skip]
static TABLE: [FormatInfo; 25] = [
    entry(ArchiveFormat::Unknown, "unknown", &[], DETECT_ONLY, false, false, false, "Unrecognized data"),
    entry(ArchiveFormat::SevenZip, "7z", &["7z"], READ_WRITE, true, true, true, "7-Zip archive"),
    entry(ArchiveFormat::Zip, "zip", &["zip", "jar", "apk"], READ_WRITE, true, false, true, "ZIP archive"),
    entry(ArchiveFormat::GZip, "gzip", &["gz", "gzip"], READ_WRITE, false, false, false, "gzip compressed stream"),
    entry(ArchiveFormat::BZip2, "bzip2", &["bz2", "bzip2"], READ_WRITE, false, false, false, "bzip2 compressed stream"),
    entry(ArchiveFormat::Tar, "tar", &["tar", "tgz", "tbz", "tbz2", "txz"], READ_WRITE, false, false, false, "tape archive"),
    entry(ArchiveFormat::Xz, "xz", &["xz"], READ_WRITE, false, false, false, "xz compressed stream"),
    entry(ArchiveFormat::Lzma, "lzma", &["lzma"], READ_WRITE, false, false, false, "LZMA-alone compressed stream"),
    entry(ArchiveFormat::Rar, "rar", &["rar"], DETECT_ONLY, true, true, true, "RAR archive"),
    entry(ArchiveFormat::Rar5, "rar5", &["rar"], DETECT_ONLY, true, true, true, "RAR5 archive"),
    entry(ArchiveFormat::Iso, "iso", &["iso", "img"], DETECT_ONLY, false, false, false, "ISO 9660 image"),
    entry(ArchiveFormat::Wim, "wim", &["wim", "swm", "esd"], DETECT_ONLY, false, true, true, "Windows imaging format"),
    entry(ArchiveFormat::Cab, "cab", &["cab"], DETECT_ONLY, false, true, true, "Microsoft cabinet"),
    entry(ArchiveFormat::Arj, "arj", &["arj"], DETECT_ONLY, true, false, true, "ARJ archive"),
    entry(ArchiveFormat::Cpio, "cpio", &["cpio"], DETECT_ONLY, false, false, false, "cpio archive"),
    entry(ArchiveFormat::Deb, "deb", &["deb"], DETECT_ONLY, false, false, false, "Debian package"),
    entry(ArchiveFormat::Dmg, "dmg", &["dmg"], DETECT_ONLY, true, false, false, "Apple disk image"),
    entry(ArchiveFormat::Hfs, "hfs", &["hfs", "hfsx"], DETECT_ONLY, false, false, false, "HFS volume"),
    entry(ArchiveFormat::Lzh, "lzh", &["lzh", "lha"], DETECT_ONLY, false, false, false, "LHA archive"),
    entry(ArchiveFormat::Nsis, "nsis", &["nsis"], DETECT_ONLY, false, true, false, "NSIS installer"),
    entry(ArchiveFormat::Rpm, "rpm", &["rpm"], DETECT_ONLY, false, false, false, "RPM package"),
    entry(ArchiveFormat::Udf, "udf", &["udf"], DETECT_ONLY, false, false, false, "UDF image"),
    entry(ArchiveFormat::Vhd, "vhd", &["vhd", "vhdx"], DETECT_ONLY, false, false, false, "virtual hard disk"),
    entry(ArchiveFormat::Xar, "xar", &["xar", "pkg"], DETECT_ONLY, false, false, false, "XAR archive"),
    entry(ArchiveFormat::Z, "z", &["z", "taz"], DETECT_ONLY, false, false, false, "Unix compress stream"),
];

impl FormatInfo {
    /// Returns the descriptor for `format`.
    pub fn of(format: ArchiveFormat) -> &'static FormatInfo {
        TABLE
            .iter()
            .find(|info| info.format == format)
            .unwrap_or(&TABLE[0])
    }

    /// All descriptors, `Unknown` first.
    pub fn all() -> &'static [FormatInfo] {
        &TABLE
    }

    /// Formats this crate can create.
    pub fn writable() -> impl Iterator<Item = &'static FormatInfo> {
        TABLE.iter().filter(|info| info.can_write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_format() {
        assert_eq!(FormatInfo::all().len(), ArchiveFormat::ALL.len() + 1);
        for info in FormatInfo::all() {
            assert_eq!(FormatInfo::of(info.format), info);
        }
    }

    #[test]
    fn capability_flags() {
        let sz = FormatInfo::of(ArchiveFormat::SevenZip);
        assert!(sz.can_read && sz.can_write && sz.supports_encryption && sz.supports_solid);
        let zip = FormatInfo::of(ArchiveFormat::Zip);
        assert!(zip.supports_encryption && !zip.supports_solid);
        let gz = FormatInfo::of(ArchiveFormat::GZip);
        assert!(gz.can_write && !gz.supports_encryption && !gz.supports_multi_volume);
        assert!(!FormatInfo::of(ArchiveFormat::Rar5).can_read);
    }

    #[test]
    fn writable_formats() {
        let names: Vec<_> = FormatInfo::writable().map(|i| i.name).collect();
        assert_eq!(names, ["7z", "zip", "gzip", "bzip2", "tar", "xz", "lzma"]);
    }
}
