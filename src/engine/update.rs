//! Item collection and data pumping shared by the writing handlers.

use std::io::{self, Read, Write};

use super::{EngineCode, EngineFailure, EngineResult, UpdateCallback, UpdateOp};
use crate::Timestamp;
use crate::property::{PropId, PropValue, attributes};
use crate::stream::InStream;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Metadata of one item to write, queried from the update callback.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingItem {
    pub index: usize,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<Timestamp>,
    pub created: Option<Timestamp>,
    pub accessed: Option<Timestamp>,
    pub attributes: Option<u32>,
    pub symlink: Option<String>,
    pub hard_link: Option<String>,
}

impl PendingItem {
    pub fn is_link(&self) -> bool {
        self.symlink.is_some() || self.hard_link.is_some()
    }

    /// Fails for link items in formats that can only hold files and
    /// directories.
    pub fn reject_link(&self, format: impl std::fmt::Display) -> EngineResult<()> {
        if self.is_link() {
            return Err(EngineFailure::new(
                EngineCode::NOT_SUPPORTED,
                format!("{format} cannot store link '{}'", self.path),
            ));
        }
        Ok(())
    }

    /// POSIX permission bits carried in the attributes, or a default.
    pub fn unix_mode(&self) -> u32 {
        self.attributes
            .and_then(attributes::unix_mode)
            .map(|mode| mode & 0o7777)
            .unwrap_or(match (self.is_dir, &self.symlink) {
                (true, _) => 0o755,
                (false, Some(_)) => 0o777,
                (false, None) => 0o644,
            })
    }
}

/// Queries metadata for all `count` items.
///
/// Only new items are accepted: this layer creates archives, it does not
/// modify existing ones.
pub(crate) fn collect(
    callback: &mut dyn UpdateCallback,
    count: usize,
) -> EngineResult<Vec<PendingItem>> {
    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        let flags = callback.get_update_item_info(index)?;
        if !flags.new_data || flags.index_in_archive.is_some() {
            return Err(EngineFailure::new(
                EngineCode::E_NOTIMPL,
                format!("item {index} refers to existing archive data"),
            ));
        }
        let path = match callback.get_property(index, PropId::Path)? {
            PropValue::Str(path) if !path.is_empty() => path,
            _ => {
                return Err(EngineFailure::new(
                    EngineCode::E_INVALIDARG,
                    format!("item {index} has no path"),
                ));
            }
        };
        let is_dir = callback
            .get_property(index, PropId::IsDir)?
            .as_bool()
            .unwrap_or(false);
        let (symlink, hard_link) = if is_dir {
            (None, None)
        } else {
            (
                link_target(callback, index, PropId::SymLink)?,
                link_target(callback, index, PropId::HardLink)?,
            )
        };
        let size = if is_dir || symlink.is_some() || hard_link.is_some() {
            0
        } else {
            callback.get_property(index, PropId::Size)?.as_u64().unwrap_or(0)
        };
        items.push(PendingItem {
            index,
            path,
            is_dir,
            size,
            modified: callback.get_property(index, PropId::MTime)?.as_time(),
            created: callback.get_property(index, PropId::CTime)?.as_time(),
            accessed: callback.get_property(index, PropId::ATime)?.as_time(),
            attributes: callback.get_property(index, PropId::Attrib)?.as_u32(),
            symlink,
            hard_link,
        });
    }
    Ok(items)
}

fn link_target(
    callback: &mut dyn UpdateCallback,
    index: usize,
    id: PropId,
) -> EngineResult<Option<String>> {
    Ok(match callback.get_property(index, id)? {
        PropValue::Str(target) if !target.is_empty() => Some(target),
        _ => None,
    })
}

/// Opens the data stream of a file item.
pub(crate) fn open_item(
    callback: &mut dyn UpdateCallback,
    item: &PendingItem,
) -> EngineResult<Box<dyn InStream>> {
    callback.get_stream2(item.index, UpdateOp::Add)?.ok_or_else(|| {
        EngineFailure::new(
            EngineCode::E_FAIL,
            format!("no data stream for '{}'", item.path),
        )
    })
}

/// Copies `source` into `sink`, reporting the running byte count as
/// `base + copied`. Returns the number of bytes copied.
pub(crate) fn copy_with_progress(
    callback: &mut dyn UpdateCallback,
    source: &mut dyn Read,
    sink: &mut dyn Write,
    base: u64,
) -> EngineResult<u64> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        sink.write_all(&buffer[..n])?;
        copied += n as u64;
        callback.set_completed(base + copied)?;
    }
    Ok(copied)
}

/// Reader that reports the absolute byte count after every read.
///
/// A failing progress call is kept in `failure` and surfaces to the encoder
/// as a failed read.
pub(crate) struct ProgressReader<'a> {
    inner: &'a mut dyn Read,
    callback: &'a mut dyn UpdateCallback,
    pub completed: u64,
    pub failure: Option<EngineFailure>,
}

impl<'a> ProgressReader<'a> {
    pub fn new(inner: &'a mut dyn Read, callback: &'a mut dyn UpdateCallback, base: u64) -> Self {
        Self {
            inner,
            callback,
            completed: base,
            failure: None,
        }
    }
}

impl Read for ProgressReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failure.is_some() {
            return Err(io::Error::other("update aborted"));
        }
        let n = self.inner.read(buf)?;
        self.completed += n as u64;
        if let Err(failure) = self.callback.set_completed(self.completed) {
            self.failure = Some(failure);
            return Err(io::Error::other("update aborted"));
        }
        Ok(n)
    }
}

/// Reports success for every item after the archive has been written.
pub(crate) fn report_success(
    callback: &mut dyn UpdateCallback,
    items: &[PendingItem],
) -> EngineResult<()> {
    for item in items {
        callback.set_operation_result(item.index, super::OperationResult::Ok)?;
    }
    Ok(())
}

pub(crate) fn total_size(items: &[PendingItem]) -> u64 {
    items.iter().map(|item| item.size).sum()
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted update callback for handler tests.

    use super::*;
    use crate::Password;
    use crate::engine::{NewItemFlags, OperationResult, ProgressCallback};
    use crate::stream::MemoryInStream;

    pub struct ScriptedItem {
        pub path: String,
        pub data: Option<Vec<u8>>,
        pub link: Option<(PropId, String)>,
        pub declared_size: Option<u64>,
    }

    /// Feeds `(path, Some(data))` files and `(path, None)` directories.
    #[derive(Default)]
    pub struct ScriptedUpdate {
        pub items: Vec<ScriptedItem>,
        pub password: Option<Password>,
        pub results: Vec<(usize, OperationResult)>,
        pub completed: u64,
        pub opened: Vec<usize>,
    }

    impl ScriptedUpdate {
        pub fn new(items: &[(&str, Option<&[u8]>)]) -> Self {
            Self {
                items: items
                    .iter()
                    .map(|(path, data)| ScriptedItem {
                        path: (*path).to_string(),
                        data: data.map(<[u8]>::to_vec),
                        link: None,
                        declared_size: None,
                    })
                    .collect(),
                ..Self::default()
            }
        }

        /// Appends a link item; `kind` is `PropId::SymLink` or `PropId::HardLink`.
        pub fn with_link(mut self, path: &str, kind: PropId, target: &str) -> Self {
            self.items.push(ScriptedItem {
                path: path.to_string(),
                data: None,
                link: Some((kind, target.to_string())),
                declared_size: None,
            });
            self
        }

        /// Reports `size` for item `index` regardless of its data, like a
        /// source that changed after it was queued.
        pub fn with_declared_size(mut self, index: usize, size: u64) -> Self {
            self.items[index].declared_size = Some(size);
            self
        }
    }

    impl ProgressCallback for ScriptedUpdate {
        fn set_total(&mut self, _total: u64) -> EngineResult<()> {
            Ok(())
        }

        fn set_completed(&mut self, completed: u64) -> EngineResult<()> {
            self.completed = completed;
            Ok(())
        }
    }

    impl UpdateCallback for ScriptedUpdate {
        fn get_update_item_info(&mut self, _index: usize) -> EngineResult<NewItemFlags> {
            Ok(NewItemFlags {
                new_data: true,
                new_props: true,
                index_in_archive: None,
            })
        }

        fn get_property(&mut self, index: usize, id: PropId) -> EngineResult<PropValue> {
            let item = &self.items[index];
            Ok(match id {
                PropId::Path => item.path.clone().into(),
                PropId::IsDir => (item.data.is_none() && item.link.is_none()).into(),
                PropId::SymLink | PropId::HardLink => match &item.link {
                    Some((kind, target)) if *kind == id => target.clone().into(),
                    _ => PropValue::Empty,
                },
                PropId::Size => item
                    .declared_size
                    .unwrap_or(item.data.as_ref().map_or(0, Vec::len) as u64)
                    .into(),
                PropId::MTime => Timestamp::from_unix_secs(1_700_000_000).into(),
                _ => PropValue::Empty,
            })
        }

        fn get_stream(&mut self, index: usize) -> EngineResult<Option<Box<dyn InStream>>> {
            self.opened.push(index);
            Ok(self.items[index]
                .data
                .clone()
                .map(|data| Box::new(MemoryInStream::new(data)) as Box<dyn InStream>))
        }

        fn set_operation_result(
            &mut self,
            index: usize,
            result: OperationResult,
        ) -> EngineResult<()> {
            self.results.push((index, result));
            Ok(())
        }

        fn crypto_get_text_password(&mut self) -> EngineResult<Option<Password>> {
            Ok(self.password.clone())
        }
    }
}
