//! Archive information types.

use crate::engine::InArchive;
use crate::format::ArchiveFormat;
use crate::property::{PropId, PropValue, attributes};
use crate::{Error, Result, Timestamp};

/// One item of an opened archive.
///
/// Built from the engine's item properties each time it is queried, so two
/// queries of the same index on the same reader return equal values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveItemInfo {
    /// Position in the archive, `0..item_count`.
    pub index: usize,
    /// Forward-slash separated path inside the archive.
    pub path: String,
    /// Whether the item is a directory.
    pub is_dir: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Compressed size in bytes; 0 when the format does not record it per item.
    pub packed_size: u64,
    /// Stored CRC-32 of the data.
    pub crc: Option<u32>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Last access time.
    pub accessed: Option<Timestamp>,
    /// Last modification time.
    pub modified: Option<Timestamp>,
    /// Windows attribute bits, with the POSIX mode in the high word when
    /// [`attributes::UNIX_EXTENSION`] is set.
    pub attributes: Option<u32>,
    /// Whether the item data is encrypted.
    pub encrypted: bool,
    /// Item comment.
    pub comment: Option<String>,
    /// Compression method name as reported by the format.
    pub method: Option<String>,
}

impl ArchiveItemInfo {
    pub(crate) fn query(archive: &dyn InArchive, index: usize) -> Result<Self> {
        let prop = |id: PropId| -> Result<PropValue> {
            archive
                .item_property(index, id)
                .map_err(|f| f.into_error(&format!("item {index}")))
        };
        Ok(Self {
            index,
            path: prop(PropId::Path)?.as_str().unwrap_or_default().to_string(),
            is_dir: prop(PropId::IsDir)?.as_bool().unwrap_or(false),
            size: prop(PropId::Size)?.as_u64().unwrap_or(0),
            packed_size: prop(PropId::PackSize)?.as_u64().unwrap_or(0),
            crc: prop(PropId::Crc)?.as_u32(),
            created: prop(PropId::CTime)?.as_time(),
            accessed: prop(PropId::ATime)?.as_time(),
            modified: prop(PropId::MTime)?.as_time(),
            attributes: prop(PropId::Attrib)?.as_u32(),
            encrypted: prop(PropId::Encrypted)?.as_bool().unwrap_or(false),
            comment: prop(PropId::Comment)?.as_str().map(str::to_string),
            method: prop(PropId::Method)?.as_str().map(str::to_string),
        })
    }

    /// Returns the file name, the last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// POSIX permission bits, when the archive recorded them.
    pub fn unix_mode(&self) -> Option<u32> {
        self.attributes.and_then(attributes::unix_mode)
    }

    /// Whether the read-only attribute is set.
    pub fn is_read_only(&self) -> bool {
        self.attributes
            .is_some_and(|a| a & attributes::READONLY != 0)
    }
}

/// Summary of an opened archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Archive format.
    pub format: ArchiveFormat,
    /// Number of items.
    pub item_count: usize,
    /// Total size of the archive data in bytes, all volumes included.
    pub physical_size: u64,
    /// Sum of the uncompressed item sizes.
    pub total_size: u64,
    /// Whether items share compression blocks.
    pub is_solid: bool,
    /// Whether the archive was read from more than one volume.
    pub is_multi_volume: bool,
    /// Number of volumes read.
    pub volume_count: u32,
    /// Whether the item listing itself is encrypted.
    pub has_encrypted_header: bool,
    /// Whether any item is encrypted.
    pub has_encrypted_items: bool,
    /// Archive-level method name, when the format reports one.
    pub method: Option<String>,
    /// Archive comment.
    pub comment: Option<String>,
}

impl ArchiveInfo {
    /// Returns the compression ratio (physical / uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.physical_size as f64 / self.total_size as f64
        }
    }
}

/// An item that failed during a best-effort extraction or test.
#[derive(Debug)]
pub struct ItemFailure {
    /// Index of the item.
    pub index: usize,
    /// Path of the item.
    pub path: String,
    /// What went wrong.
    pub error: Error,
}

/// Outcome of an extraction or test over several items.
///
/// Extracting many items is best-effort: one failing item does not stop the
/// rest. Use [`ExtractSummary::into_result`] for fail-fast semantics.
#[must_use = "extraction summaries carry per-item failures that should be checked"]
#[derive(Debug, Default)]
pub struct ExtractSummary {
    /// Items written (or verified, when testing).
    pub items_extracted: usize,
    /// Items that failed.
    pub items_failed: usize,
    /// Items left alone because of the overwrite policy.
    pub items_skipped: usize,
    /// Bytes of item data written or verified.
    pub bytes_extracted: u64,
    /// Details of each failure, in extraction order.
    pub failures: Vec<ItemFailure>,
}

impl ExtractSummary {
    /// Returns true if no item failed.
    pub fn is_ok(&self) -> bool {
        self.items_failed == 0
    }

    /// Returns `Err` with the first failure, or the summary when every item
    /// succeeded.
    pub fn into_result(mut self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(self.failures.remove(0).error)
        }
    }

    pub(crate) fn record_success(&mut self, bytes: u64) {
        self.items_extracted += 1;
        self.bytes_extracted += bytes;
    }

    pub(crate) fn record_failure(&mut self, index: usize, path: &str, error: Error) {
        log::debug!("item {index} ({path}) failed: {error}");
        self.items_failed += 1;
        self.failures.push(ItemFailure {
            index,
            path: path.to_string(),
            error,
        });
    }
}
