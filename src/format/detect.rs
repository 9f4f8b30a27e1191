//! Archive format detection.
//!
//! Detection is signature-first: the leading bytes of the input are matched
//! against an ordered table of magic numbers, each at a fixed offset, and
//! the first match wins. When nothing matches, or the file cannot be read,
//! the file name's extension decides.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::ArchiveFormat;

/// Bytes read from the start of a file for signature matching.
///
/// Covers the ISO 9660 volume descriptor at offset 0x8001.
pub const HEADER_PROBE_SIZE: usize = 0x8010;

struct Signature {
    magic: &'static [u8],
    offset: usize,
    format: ArchiveFormat,
}

const fn sig(magic: &'static [u8], offset: usize, format: ArchiveFormat) -> Signature {
    Signature {
        magic,
        offset,
        format,
    }
}

/// Known signatures in match order. RAR5 shares the `Rar!\x1A\x07` prefix
/// with RAR4 and must come first.
const SIGNATURES: &[Signature] = &[
    sig(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C], 0, ArchiveFormat::SevenZip),
    sig(&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00], 0, ArchiveFormat::Rar5),
    sig(&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07], 0, ArchiveFormat::Rar),
    sig(b"PK\x03\x04", 0, ArchiveFormat::Zip),
    sig(b"PK\x05\x06", 0, ArchiveFormat::Zip),
    sig(b"PK\x07\x08", 0, ArchiveFormat::Zip),
    sig(&[0x1F, 0x8B], 0, ArchiveFormat::GZip),
    sig(b"BZh", 0, ArchiveFormat::BZip2),
    sig(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00], 0, ArchiveFormat::Xz),
    sig(b"MSCF", 0, ArchiveFormat::Cab),
    sig(b"MSWIM\0\0\0", 0, ArchiveFormat::Wim),
    sig(&[0xED, 0xAB, 0xEE, 0xDB], 0, ArchiveFormat::Rpm),
    sig(b"070707", 0, ArchiveFormat::Cpio),
    sig(b"070701", 0, ArchiveFormat::Cpio),
    sig(b"070702", 0, ArchiveFormat::Cpio),
    sig(b"!<arch>\ndebian", 0, ArchiveFormat::Deb),
    sig(b"xar!", 0, ArchiveFormat::Xar),
    sig(b"conectix", 0, ArchiveFormat::Vhd),
    sig(b"vhdxfile", 0, ArchiveFormat::Vhd),
    sig(&[0x60, 0xEA], 0, ArchiveFormat::Arj),
    sig(&[0x1F, 0x9D], 0, ArchiveFormat::Z),
    sig(b"-lh", 2, ArchiveFormat::Lzh),
    sig(b"ustar", 257, ArchiveFormat::Tar),
    sig(b"H+\x00\x04", 0x400, ArchiveFormat::Hfs),
    sig(b"HX\x00\x05", 0x400, ArchiveFormat::Hfs),
    sig(b"CD001", 0x8001, ArchiveFormat::Iso),
    sig(b"BEA01", 0x8001, ArchiveFormat::Udf),
];

/// Matches `header` against the signature table.
///
/// `header` holds the leading bytes of the input; signatures whose offset
/// plus length exceeds it are skipped. Headerless LZMA has no magic and is
/// tried last. Returns [`ArchiveFormat::Unknown`] when nothing matches.
pub fn detect_format_from_bytes(header: &[u8]) -> ArchiveFormat {
    SIGNATURES
        .iter()
        .find(|s| {
            header
                .get(s.offset..s.offset + s.magic.len())
                .is_some_and(|window| window == s.magic)
        })
        .map(|s| s.format)
        .or_else(|| is_lzma_alone(header).then_some(ArchiveFormat::Lzma))
        .unwrap_or(ArchiveFormat::Unknown)
}

/// Checks the 13-byte `.lzma` header: a valid properties byte, a dictionary
/// of the form `2^n` or `3 * 2^n`, a plausible size (or unknown), and the
/// zero byte every range-coded stream starts with.
fn is_lzma_alone(header: &[u8]) -> bool {
    let Some(h) = header.get(..14) else {
        return false;
    };
    if h[0] >= 9 * 5 * 5 {
        return false;
    }
    let dictionary = u32::from_le_bytes([h[1], h[2], h[3], h[4]]);
    let dictionary_ok = dictionary == u32::MAX
        || (1..31).any(|shift| dictionary == 2 << shift || dictionary == 3 << shift);
    let mut size = [0u8; 8];
    size.copy_from_slice(&h[5..13]);
    let size = u64::from_le_bytes(size);
    dictionary_ok && (size == u64::MAX || size < 1 << 56) && h[13] == 0
}

/// Detects the format of the file at `path`.
///
/// Reads up to [`HEADER_PROBE_SIZE`] bytes and matches signatures; falls
/// back to [`guess_format_from_extension`] when the content is unrecognized
/// or unreadable. Never fails.
pub fn detect_format(path: impl AsRef<Path>) -> ArchiveFormat {
    let path = path.as_ref();
    match read_header(path) {
        Ok(header) => {
            let format = detect_format_from_bytes(&header);
            if format != ArchiveFormat::Unknown {
                return format;
            }
        }
        Err(e) => log::debug!("signature probe of {} failed: {e}", path.display()),
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(ArchiveFormat::Unknown, guess_format_from_extension)
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_PROBE_SIZE);
    File::open(path)?
        .take(HEADER_PROBE_SIZE as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Maps a file name or bare extension to a format.
///
/// Compound tar extensions (`.tar.gz`, `.tar.bz2`, `.tar.xz`, `.tar.lzma`)
/// resolve to [`ArchiveFormat::Tar`], as do `tgz`, `tbz2` and `txz`. Matching
/// ignores case.
///
/// ```rust
/// use szbridge::format::{ArchiveFormat, guess_format_from_extension};
///
/// assert_eq!(guess_format_from_extension("backup.tar.gz"), ArchiveFormat::Tar);
/// assert_eq!(guess_format_from_extension("tar.gz"), ArchiveFormat::Tar);
/// assert_eq!(guess_format_from_extension("notes.GZ"), ArchiveFormat::GZip);
/// assert_eq!(guess_format_from_extension("7z"), ArchiveFormat::SevenZip);
/// ```
pub fn guess_format_from_extension(name: &str) -> ArchiveFormat {
    let lower = name.to_ascii_lowercase();
    let mut segments = lower.rsplit('.');
    let Some(last) = segments.next() else {
        return ArchiveFormat::Unknown;
    };
    if segments.next() == Some("tar") && matches!(last, "gz" | "bz2" | "xz" | "lzma") {
        return ArchiveFormat::Tar;
    }
    extension_format(last)
}

fn extension_format(ext: &str) -> ArchiveFormat {
    match ext {
        "7z" => ArchiveFormat::SevenZip,
        "zip" | "jar" | "apk" => ArchiveFormat::Zip,
        "gz" | "gzip" => ArchiveFormat::GZip,
        "bz2" | "bzip2" => ArchiveFormat::BZip2,
        "tar" | "tgz" | "tbz" | "tbz2" | "txz" => ArchiveFormat::Tar,
        "xz" => ArchiveFormat::Xz,
        "lzma" => ArchiveFormat::Lzma,
        "rar" => ArchiveFormat::Rar,
        "iso" | "img" => ArchiveFormat::Iso,
        "wim" | "swm" | "esd" => ArchiveFormat::Wim,
        "cab" => ArchiveFormat::Cab,
        "arj" => ArchiveFormat::Arj,
        "cpio" => ArchiveFormat::Cpio,
        "deb" => ArchiveFormat::Deb,
        "dmg" => ArchiveFormat::Dmg,
        "hfs" | "hfsx" => ArchiveFormat::Hfs,
        "lzh" | "lha" => ArchiveFormat::Lzh,
        "rpm" => ArchiveFormat::Rpm,
        "udf" => ArchiveFormat::Udf,
        "vhd" | "vhdx" => ArchiveFormat::Vhd,
        "xar" | "pkg" => ArchiveFormat::Xar,
        "z" | "taz" => ArchiveFormat::Z,
        _ => ArchiveFormat::Unknown,
    }
}
