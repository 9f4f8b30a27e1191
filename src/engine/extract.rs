//! Per-item extraction plumbing shared by all handlers.
//!
//! A handler decodes each item into the writer handed out by
//! [`ExtractSession::item`]. The writer forwards to the callback's stream,
//! reports progress after every write and checksums the output; the session
//! turns the outcome into an [`OperationResult`].

use std::io::{self, Write};

use super::record::ItemRecord;
use super::{AskMode, EngineFailure, EngineResult, ExtractCallback, OperationResult};
use crate::Password;
use crate::stream::OutStream;

pub(crate) struct ExtractSession<'a> {
    callback: &'a mut dyn ExtractCallback,
    mode: AskMode,
    completed: u64,
    password: Option<Option<Password>>,
}

impl<'a> ExtractSession<'a> {
    /// Announces the total size of `selected` and starts the session.
    pub fn begin(
        callback: &'a mut dyn ExtractCallback,
        items: &[ItemRecord],
        selected: &[usize],
        test: bool,
    ) -> EngineResult<Self> {
        let total = selected
            .iter()
            .filter_map(|&i| items.get(i))
            .map(|item| item.size)
            .sum();
        callback.set_total(total)?;
        Ok(Self {
            callback,
            mode: if test { AskMode::Test } else { AskMode::Extract },
            completed: 0,
            password: None,
        })
    }

    /// Session password, asked from the callback once.
    pub fn password(&mut self) -> EngineResult<Option<Password>> {
        if self.password.is_none() {
            self.password = Some(self.callback.password()?);
        }
        Ok(self.password.clone().flatten())
    }

    /// Decodes one item through `decode` and reports its result.
    ///
    /// Returns the reported result. `Err` means the whole extraction must
    /// stop: the callback cancelled or the output stream failed.
    pub fn item(
        &mut self,
        index: usize,
        record: &ItemRecord,
        decode: impl FnOnce(&mut dyn Write) -> EngineResult<()>,
    ) -> EngineResult<OperationResult> {
        log::trace!("extracting item {index} ({})", record.path);
        let stream = self.callback.get_stream(index, self.mode)?;
        self.callback.prepare_operation(index, self.mode)?;

        let mut sink = ProgressSink {
            out: stream,
            callback: &mut *self.callback,
            base: self.completed,
            written: 0,
            hasher: crc32fast::Hasher::new(),
            abort: None,
            output_error: None,
        };
        let decoded = decode(&mut sink);
        let flushed = sink.flush_output();
        let ProgressSink {
            out,
            written,
            hasher,
            abort,
            output_error,
            ..
        } = sink;
        drop(out);
        self.completed += written;

        if let Some(failure) = abort {
            return Err(failure);
        }
        if let Some(error) = output_error {
            return Err(error.into());
        }
        flushed?;

        let result = match decoded {
            Ok(()) => match record.crc {
                Some(expected) if !record.is_dir && expected != hasher.finalize() => {
                    if record.encrypted {
                        OperationResult::WrongPassword
                    } else {
                        OperationResult::CrcError
                    }
                }
                _ => OperationResult::Ok,
            },
            Err(failure) => {
                log::debug!("item {index} ({}) failed: {failure}", record.path);
                OperationResult::from_failure(&failure, record.encrypted)
            }
        };
        self.callback.set_operation_result(index, result)?;
        Ok(result)
    }

    /// Reports `result` for an item that could not be decoded at all.
    pub fn fail(&mut self, index: usize, result: OperationResult) -> EngineResult<()> {
        let stream = self.callback.get_stream(index, self.mode)?;
        drop(stream);
        self.callback.prepare_operation(index, self.mode)?;
        self.callback.set_operation_result(index, result)
    }
}

struct ProgressSink<'c> {
    out: Option<Box<dyn OutStream>>,
    callback: &'c mut dyn ExtractCallback,
    base: u64,
    written: u64,
    hasher: crc32fast::Hasher,
    abort: Option<EngineFailure>,
    output_error: Option<io::Error>,
}

impl ProgressSink<'_> {
    fn flush_output(&mut self) -> EngineResult<()> {
        match self.out.as_mut() {
            Some(out) if self.abort.is_none() && self.output_error.is_none() => {
                out.flush().map_err(EngineFailure::from)
            }
            _ => Ok(()),
        }
    }
}

impl Write for ProgressSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.abort.is_some() {
            return Err(io::Error::other("operation aborted"));
        }
        let n = match self.out.as_mut() {
            Some(out) => match out.write(buf) {
                Ok(n) => n,
                Err(e) => {
                    let kind = e.kind();
                    self.output_error = Some(e);
                    return Err(io::Error::new(kind, "output stream failed"));
                }
            },
            None => buf.len(),
        };
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        if let Err(failure) = self.callback.set_completed(self.base + self.written) {
            self.abort = Some(failure);
            return Err(io::Error::other("operation aborted"));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
