//! The extraction callback handed to the engine.
//!
//! Each item moves through `get_stream`, `prepare_operation` and
//! `set_operation_result`. Failures that belong to one item, such as an
//! unsafe path or an existing file, are parked until the item's result
//! arrives so the engine can go on with the next item. Only cancellation
//! stops the whole run.

use std::collections::HashMap;

use super::destination::Destination;
use super::info::{ArchiveItemInfo, ExtractSummary};
use crate::engine::{
    AskMode, EngineResult, ExtractCallback, OperationResult, ProgressCallback, guard,
};
use crate::progress::ProgressTracker;
use crate::stream::OutStream;
use crate::{Error, ErrorCode, Password, Result};

enum Outcome {
    Writing,
    Verifying,
    Directory,
    Skipped,
    Failed(Error),
}

pub(crate) struct ExtractDriver<'a> {
    items: HashMap<usize, ArchiveItemInfo>,
    destination: &'a mut dyn Destination,
    tracker: ProgressTracker<'a>,
    password: Option<Password>,
    current: Option<(usize, Outcome)>,
    summary: ExtractSummary,
}

impl<'a> ExtractDriver<'a> {
    pub fn new(
        items: Vec<ArchiveItemInfo>,
        destination: &'a mut dyn Destination,
        tracker: ProgressTracker<'a>,
        password: Option<Password>,
    ) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.index, item)).collect(),
            destination,
            tracker,
            password,
            current: None,
            summary: ExtractSummary::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.tracker.is_cancelled()
    }

    pub fn into_summary(self) -> ExtractSummary {
        self.summary
    }

    fn item(&self, index: usize) -> Result<&ArchiveItemInfo> {
        self.items
            .get(&index)
            .ok_or_else(|| Error::InvalidArgument(format!("engine asked for unselected item {index}")))
    }

    fn open(&mut self, index: usize, mode: AskMode) -> Result<Option<Box<dyn OutStream>>> {
        let item = self.item(index)?.clone();
        self.tracker.item_start(&item.path, item.size)?;

        let (outcome, stream) = if mode != AskMode::Extract {
            (Outcome::Verifying, None)
        } else if item.is_dir {
            match self.destination.directory(&item) {
                Ok(()) => (Outcome::Directory, None),
                Err(e) => (Outcome::Failed(e), None),
            }
        } else {
            match self.destination.open(&item) {
                Ok(Some(stream)) => (Outcome::Writing, Some(stream)),
                Ok(None) => (Outcome::Skipped, None),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => (Outcome::Failed(e), None),
            }
        };
        self.current = Some((index, outcome));
        Ok(stream)
    }

    fn finish(&mut self, index: usize, result: OperationResult) -> Result<()> {
        let item = self.item(index)?.clone();
        let outcome = match self.current.take() {
            Some((current, outcome)) if current == index => outcome,
            _ => Outcome::Verifying,
        };

        let failure = match (outcome, result.error_code()) {
            (Outcome::Failed(error), _) => Some(error),
            (Outcome::Skipped, _) => {
                self.summary.items_skipped += 1;
                self.tracker.item_complete(&item.path, true);
                return Ok(());
            }
            (_, None) => None,
            (_, Some(code)) => Some(result_error(code, &item)),
        };

        let success = failure.is_none();
        self.destination.complete(&item, success)?;
        self.tracker.item_complete(&item.path, success);
        match failure {
            None => self.summary.record_success(if item.is_dir { 0 } else { item.size }),
            Some(error) => self.summary.record_failure(index, &item.path, error),
        }
        Ok(())
    }
}

fn result_error(code: ErrorCode, item: &ArchiveItemInfo) -> Error {
    Error::new(code, code.description()).with_entry(item.index, &item.path)
}

impl ProgressCallback for ExtractDriver<'_> {
    fn set_total(&mut self, total: u64) -> EngineResult<()> {
        self.tracker.set_total(total);
        Ok(())
    }

    fn set_completed(&mut self, completed: u64) -> EngineResult<()> {
        guard(|| self.tracker.set_completed(completed))
    }
}

impl ExtractCallback for ExtractDriver<'_> {
    fn get_stream(
        &mut self,
        index: usize,
        mode: AskMode,
    ) -> EngineResult<Option<Box<dyn OutStream>>> {
        guard(|| self.open(index, mode))
    }

    fn prepare_operation(&mut self, _index: usize, _mode: AskMode) -> EngineResult<()> {
        Ok(())
    }

    fn set_operation_result(
        &mut self,
        index: usize,
        result: OperationResult,
    ) -> EngineResult<()> {
        guard(|| self.finish(index, result))
    }

    fn password(&mut self) -> EngineResult<Option<Password>> {
        Ok(self.password.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::engine::EngineCode;
    use crate::progress::progress_fn;
    use crate::read::destination::MemoryDestination;
    use crate::stream::SharedBuffer;

    fn items() -> Vec<ArchiveItemInfo> {
        vec![
            ArchiveItemInfo {
                index: 0,
                path: "a.txt".into(),
                size: 4,
                ..ArchiveItemInfo::default()
            },
            ArchiveItemInfo {
                index: 1,
                path: "secret.txt".into(),
                size: 6,
                encrypted: true,
                ..ArchiveItemInfo::default()
            },
        ]
    }

    #[test]
    fn results_feed_the_summary() {
        let buffer = SharedBuffer::new();
        let mut dest = MemoryDestination::new(buffer.clone());
        let mut driver =
            ExtractDriver::new(items(), &mut dest, ProgressTracker::new(None), None);

        let mut out = driver.get_stream(0, AskMode::Extract).unwrap().unwrap();
        out.write_all(b"data").unwrap();
        drop(out);
        driver.set_operation_result(0, OperationResult::Ok).unwrap();

        driver.get_stream(1, AskMode::Extract).unwrap();
        driver
            .set_operation_result(1, OperationResult::WrongPassword)
            .unwrap();

        let summary = driver.into_summary();
        assert_eq!(summary.items_extracted, 1);
        assert_eq!(summary.bytes_extracted, 4);
        assert_eq!(summary.items_failed, 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.index, 1);
        assert!(failure.error.is_password());
        assert_eq!(failure.error.entry_index(), Some(1));
        assert_eq!(buffer.to_vec(), b"data");
    }

    #[test]
    fn test_mode_asks_for_no_stream() {
        let mut dest = MemoryDestination::new(SharedBuffer::new());
        let mut driver =
            ExtractDriver::new(items(), &mut dest, ProgressTracker::new(None), None);
        assert!(driver.get_stream(0, AskMode::Test).unwrap().is_none());
        driver
            .set_operation_result(0, OperationResult::CrcError)
            .unwrap();
        let summary = driver.into_summary();
        assert_eq!(summary.failures[0].error.code(), ErrorCode::CrcError);
    }

    #[test]
    fn declined_progress_aborts() {
        let mut reporter = progress_fn(|done, _| done < 10);
        let mut dest = MemoryDestination::new(SharedBuffer::new());
        let mut driver = ExtractDriver::new(
            items(),
            &mut dest,
            ProgressTracker::new(Some(&mut reporter)),
            None,
        );
        driver.set_total(100).unwrap();
        driver.set_completed(5).unwrap();
        let failure = driver.set_completed(20).unwrap_err();
        assert_eq!(failure.code, EngineCode::E_ABORT);
        assert!(driver.is_cancelled());
    }

    #[test]
    fn password_is_forwarded() {
        let mut dest = MemoryDestination::new(SharedBuffer::new());
        let mut driver = ExtractDriver::new(
            items(),
            &mut dest,
            ProgressTracker::new(None),
            Some(Password::new("pw")),
        );
        assert_eq!(driver.password().unwrap(), Some(Password::new("pw")));
    }
}
