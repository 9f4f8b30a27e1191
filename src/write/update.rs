//! The update callback handed to the engine.
//!
//! Every queued item is reported as new. Writing is all-or-nothing: a
//! non-success result for any item fails the whole update.

use super::item::{FileSource, LinkTarget, UpdateItemInfo};
use crate::engine::{
    EngineResult, NewItemFlags, OperationResult, ProgressCallback, UpdateCallback, guard,
};
use crate::progress::ProgressTracker;
use crate::property::{PropId, PropValue};
use crate::stream::{FileInStream, InStream, MemoryInStream};
use crate::{Error, ErrorCode, Password, Result};

pub(crate) struct UpdateDriver<'a> {
    items: &'a [UpdateItemInfo],
    tracker: ProgressTracker<'a>,
    password: Option<Password>,
    written: usize,
}

impl<'a> UpdateDriver<'a> {
    pub fn new(
        items: &'a [UpdateItemInfo],
        tracker: ProgressTracker<'a>,
        password: Option<Password>,
    ) -> Self {
        Self {
            items,
            tracker,
            password: password.filter(|p| !p.is_empty()),
            written: 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.tracker.is_cancelled()
    }

    /// Items the engine reported as written.
    pub fn written(&self) -> usize {
        self.written
    }

    fn item(&self, index: usize) -> Result<&'a UpdateItemInfo> {
        self.items.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "engine asked for item {index} of {}",
                self.items.len()
            ))
        })
    }

    fn open(&mut self, index: usize) -> Result<Option<Box<dyn InStream>>> {
        let item = self.item(index)?;
        self.tracker.item_start(item.path.as_str(), item.size)?;
        log::trace!("reading {}", item.path);
        let stream: Box<dyn InStream> = match &item.source {
            FileSource::None => return Ok(None),
            FileSource::SourcePath(path) => Box::new(FileInStream::open(path)?),
            FileSource::InMemory(data) => Box::new(MemoryInStream::new(data.clone())),
        };
        Ok(Some(stream))
    }

    fn finish(&mut self, index: usize, result: OperationResult) -> Result<()> {
        let item = self.item(index)?;
        let success = result.is_ok();
        self.tracker.item_complete(item.path.as_str(), success);
        if !success {
            let code = result.error_code().unwrap_or(ErrorCode::ArchiveWriteError);
            return Err(Error::new(
                ErrorCode::ArchiveWriteError,
                format!("writing '{}' failed: {}", item.path, code.description()),
            ));
        }
        self.written += 1;
        Ok(())
    }
}

impl ProgressCallback for UpdateDriver<'_> {
    fn set_total(&mut self, total: u64) -> EngineResult<()> {
        self.tracker.set_total(total);
        Ok(())
    }

    fn set_completed(&mut self, completed: u64) -> EngineResult<()> {
        guard(|| self.tracker.set_completed(completed))
    }
}

impl UpdateCallback for UpdateDriver<'_> {
    fn get_update_item_info(&mut self, index: usize) -> EngineResult<NewItemFlags> {
        guard(|| {
            self.item(index)?;
            Ok(NewItemFlags {
                new_data: true,
                new_props: true,
                index_in_archive: None,
            })
        })
    }

    fn get_property(&mut self, index: usize, id: PropId) -> EngineResult<PropValue> {
        guard(|| {
            let item = self.item(index)?;
            Ok(match id {
                PropId::Path => item.path.as_str().into(),
                PropId::IsDir => item.is_dir.into(),
                PropId::Size if item.is_dir => PropValue::Empty,
                PropId::Size => item.size.into(),
                PropId::Attrib => item.attributes.into(),
                PropId::CTime => item.created.into(),
                PropId::ATime => item.accessed.into(),
                PropId::MTime => item.modified.into(),
                PropId::SymLink => match &item.link {
                    Some(LinkTarget::Symbolic(target)) => target.as_str().into(),
                    _ => PropValue::Empty,
                },
                PropId::HardLink => match &item.link {
                    Some(LinkTarget::Hard(target)) => target.as_str().into(),
                    _ => PropValue::Empty,
                },
                _ => PropValue::Empty,
            })
        })
    }

    fn get_stream(&mut self, index: usize) -> EngineResult<Option<Box<dyn InStream>>> {
        guard(|| self.open(index))
    }

    fn set_operation_result(
        &mut self,
        index: usize,
        result: OperationResult,
    ) -> EngineResult<()> {
        guard(|| self.finish(index, result))
    }

    fn crypto_get_text_password(&mut self) -> EngineResult<Option<Password>> {
        Ok(self.password.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::engine::{EngineCode, UpdateOp};

    fn items() -> Vec<UpdateItemInfo> {
        vec![
            UpdateItemInfo::directory("dir").unwrap(),
            UpdateItemInfo::from_buffer("dir/a.txt", b"abc".to_vec()).unwrap(),
        ]
    }

    #[test]
    fn properties_follow_items() {
        let items = items();
        let mut driver = UpdateDriver::new(&items, ProgressTracker::new(None), None);
        assert!(driver.get_update_item_info(0).unwrap().new_data);
        assert_eq!(driver.get_property(0, PropId::Path).unwrap().as_str(), Some("dir"));
        assert!(driver.get_property(0, PropId::Size).unwrap().is_empty());
        assert_eq!(driver.get_property(1, PropId::Size).unwrap().as_u64(), Some(3));
        assert!(driver.get_property(1, PropId::MTime).unwrap().as_time().is_some());
        assert!(driver.get_update_item_info(2).is_err());
    }

    #[test]
    fn link_targets_are_reported() {
        let items = vec![
            UpdateItemInfo::symlink("latest", "v2/app").unwrap(),
            UpdateItemInfo::hard_link("alias", "v2/app").unwrap(),
        ];
        let mut driver = UpdateDriver::new(&items, ProgressTracker::new(None), None);
        assert_eq!(driver.get_property(0, PropId::SymLink).unwrap().as_str(), Some("v2/app"));
        assert!(driver.get_property(0, PropId::HardLink).unwrap().is_empty());
        assert_eq!(driver.get_property(1, PropId::HardLink).unwrap().as_str(), Some("v2/app"));
        assert_eq!(driver.get_property(1, PropId::IsDir).unwrap().as_bool(), Some(false));
        assert!(driver.get_stream(0).unwrap().is_none());
    }

    #[test]
    fn streams_only_for_files() {
        let items = items();
        let mut driver = UpdateDriver::new(&items, ProgressTracker::new(None), None);
        assert!(driver.get_stream(0).unwrap().is_none());
        let mut data = Vec::new();
        driver
            .get_stream(1)
            .unwrap()
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, b"abc");
    }

    #[test]
    fn streamless_operations_skip_opening() {
        let items = items();
        let mut driver = UpdateDriver::new(&items, ProgressTracker::new(None), None);
        for op in [UpdateOp::Analyze, UpdateOp::Replicate, UpdateOp::Skip] {
            assert!(driver.get_stream2(1, op).unwrap().is_none());
        }
        assert!(driver.get_stream2(1, UpdateOp::Add).unwrap().is_some());
    }

    #[test]
    fn failed_item_aborts() {
        let items = items();
        let mut driver = UpdateDriver::new(&items, ProgressTracker::new(None), None);
        driver.set_operation_result(0, OperationResult::Ok).unwrap();
        let failure = driver
            .set_operation_result(1, OperationResult::DataError)
            .unwrap_err();
        assert_ne!(failure.code, EngineCode::S_OK);
        assert!(failure.message.contains("dir/a.txt"));
        assert_eq!(driver.written(), 1);
    }

    #[test]
    fn empty_password_means_none() {
        let items = items();
        let mut driver =
            UpdateDriver::new(&items, ProgressTracker::new(None), Some(Password::new("")));
        assert!(!driver.crypto_get_text_password2().unwrap().0);
    }

    #[test]
    fn missing_source_file_fails_the_stream() {
        let mut item = UpdateItemInfo::from_buffer("gone.txt", vec![1]).unwrap();
        item.source = FileSource::SourcePath("/nonexistent/szbridge/gone.txt".into());
        let items = vec![item];
        let mut driver = UpdateDriver::new(&items, ProgressTracker::new(None), None);
        assert!(driver.get_stream(0).is_err());
    }
}
