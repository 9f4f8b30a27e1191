//! Item and archive metadata materialized by handlers at open time.

use super::{EngineCode, EngineFailure, EngineResult};
use crate::Timestamp;
use crate::property::{PropId, PropValue};

/// Metadata of one archive item as read from the headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ItemRecord {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub packed_size: u64,
    pub crc: Option<u32>,
    pub created: Option<Timestamp>,
    pub accessed: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    pub attributes: Option<u32>,
    pub encrypted: bool,
    pub comment: Option<String>,
    pub method: Option<String>,
}

impl ItemRecord {
    pub fn property(&self, id: PropId) -> PropValue {
        match id {
            PropId::Path => PropValue::Str(self.path.clone()),
            PropId::IsDir => PropValue::Bool(self.is_dir),
            PropId::Size => PropValue::U64(self.size),
            PropId::PackSize => PropValue::U64(self.packed_size),
            PropId::Attrib => self.attributes.into(),
            PropId::CTime => self.created.into(),
            PropId::ATime => self.accessed.into(),
            PropId::MTime => self.modified.into(),
            PropId::Crc => self.crc.into(),
            PropId::Encrypted => PropValue::Bool(self.encrypted),
            PropId::Comment => self.comment.clone().into(),
            PropId::Method => self.method.clone().into(),
            _ => PropValue::Empty,
        }
    }
}

/// Archive-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ArchiveRecord {
    pub physical_size: u64,
    pub solid: bool,
    pub headers_encrypted: bool,
    pub method: Option<String>,
    pub comment: Option<String>,
}

impl ArchiveRecord {
    pub fn property(&self, id: PropId) -> PropValue {
        match id {
            PropId::PhySize => PropValue::U64(self.physical_size),
            PropId::Solid => PropValue::Bool(self.solid),
            PropId::HeadersEncrypted => PropValue::Bool(self.headers_encrypted),
            PropId::IsVolume => PropValue::Bool(false),
            PropId::NumVolumes => PropValue::U32(1),
            PropId::Method => self.method.clone().into(),
            PropId::Comment => self.comment.clone().into(),
            _ => PropValue::Empty,
        }
    }
}

/// Looks up `index`, failing with `E_INVALIDARG` when out of range.
pub(crate) fn item_at(items: &[ItemRecord], index: usize) -> EngineResult<&ItemRecord> {
    items.get(index).ok_or_else(|| {
        EngineFailure::new(
            EngineCode::E_INVALIDARG,
            format!("item index {index} out of range (0..{})", items.len()),
        )
    })
}

/// Sorted, de-duplicated selection; `None` selects everything.
pub(crate) fn resolve_indices(indices: Option<&[usize]>, count: usize) -> EngineResult<Vec<usize>> {
    let Some(indices) = indices else {
        return Ok((0..count).collect());
    };
    let mut selected = indices.to_vec();
    selected.sort_unstable();
    selected.dedup();
    if let Some(&bad) = selected.iter().find(|&&i| i >= count) {
        return Err(EngineFailure::new(
            EngineCode::E_INVALIDARG,
            format!("item index {bad} out of range (0..{count})"),
        ));
    }
    Ok(selected)
}

/// Normalizes a stored item name to forward slashes without a leading `./`.
pub(crate) fn normalize_name(name: &str) -> String {
    let replaced = name.replace('\\', "/");
    let trimmed = replaced.trim_start_matches("./");
    trimmed.trim_end_matches('/').to_string()
}
