//! Archive engine: format handlers and the callback contracts that drive them.
//!
//! The engine is organized the way a COM-style archive library is, with the
//! reference counting replaced by ownership:
//!
//! - An [`InArchive`] is opened over an [`InStream`], answers item and
//!   archive property queries, and extracts items by pulling output streams
//!   from an [`ExtractCallback`].
//! - An [`OutArchive`] receives generic name/value properties and writes a
//!   whole archive in one [`OutArchive::update_items`] call, pulling item
//!   metadata and data from an [`UpdateCallback`].
//!
//! Handlers are created through the process-wide registry in this module;
//! format bytes are delegated to `sevenz-rust`, `zip`, `tar`, `flate2`,
//! `bzip2` and `lzma-rust2`.
//!
//! Every callback returns an [`EngineResult`]. Implementations run their
//! bodies through [`guard`], so neither a crate [`Error`](crate::Error) nor a
//! panic crosses back into a handler unconverted.

pub mod code;
mod extract;
mod record;
mod registry;
mod sevenz;
pub(crate) mod single;
mod tar_archive;
mod update;
mod zip_archive;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

pub use code::{EngineCode, EngineFailure, EngineResult, OperationResult};
pub use registry::{create_in_archive, create_out_archive, has_handler, init};

use crate::Password;
use crate::property::{PropId, PropValue};
use crate::stream::{InStream, OutStream};

/// Progress half of the extract and update callbacks.
pub trait ProgressCallback {
    /// Announces the number of bytes the operation will process.
    fn set_total(&mut self, total: u64) -> EngineResult<()>;

    /// Reports the absolute number of bytes processed so far.
    ///
    /// A failure, typically [`EngineCode::E_ABORT`], stops the operation.
    fn set_completed(&mut self, completed: u64) -> EngineResult<()>;
}

/// What the engine intends to do with an item it asks a stream for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AskMode {
    /// Decode and write the item.
    Extract,
    /// Decode and verify without keeping the output.
    Test,
    /// Pass over the item.
    Skip,
}

/// Receiver of extracted items.
pub trait ExtractCallback: ProgressCallback {
    /// Returns the stream the item at `index` is written to, or `None` when
    /// no output is needed (directories, test mode).
    fn get_stream(&mut self, index: usize, mode: AskMode)
    -> EngineResult<Option<Box<dyn OutStream>>>;

    /// Called after [`ExtractCallback::get_stream`] and before decoding starts.
    fn prepare_operation(&mut self, index: usize, mode: AskMode) -> EngineResult<()>;

    /// Reports the outcome for one item. The stream handed out for it has
    /// been dropped by then.
    fn set_operation_result(&mut self, index: usize, result: OperationResult)
    -> EngineResult<()>;

    /// Password for encrypted items, queried on first need.
    fn password(&mut self) -> EngineResult<Option<Password>>;
}

/// Callback used while a handler opens an archive.
pub trait OpenCallback {
    /// Password for encrypted headers, queried only when needed.
    fn password(&mut self) -> EngineResult<Option<Password>>;

    /// File name of the archive, used to name the item of single-stream
    /// formats that do not store one.
    fn archive_name(&mut self) -> Option<String> {
        None
    }
}

/// Origin of an update item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NewItemFlags {
    /// The data comes from the callback, not from an existing archive.
    pub new_data: bool,
    /// The properties come from the callback.
    pub new_props: bool,
    /// Index of the item in the archive being updated, if any.
    pub index_in_archive: Option<usize>,
}

/// Operation an update handler performs on one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    /// Add a new item.
    Add,
    /// Replace an existing item.
    Update,
    /// Pre-scan the item.
    Analyze,
    /// Copy an item from the old archive unchanged.
    Replicate,
    /// Recompress an item from the old archive.
    Repack,
    /// Leave the item out.
    Skip,
    /// Remove the item.
    Delete,
    /// Rewrite archive headers only.
    Header,
}

impl UpdateOp {
    /// True for operations that read item data from the callback.
    pub fn needs_stream(self) -> bool {
        matches!(self, Self::Add | Self::Update)
    }
}

/// Supplier of the items written by [`OutArchive::update_items`].
pub trait UpdateCallback: ProgressCallback {
    /// Describes where the item at `index` comes from.
    fn get_update_item_info(&mut self, index: usize) -> EngineResult<NewItemFlags>;

    /// Returns one property of the item at `index`.
    fn get_property(&mut self, index: usize, id: PropId) -> EngineResult<PropValue>;

    /// Opens the data of the item at `index`; `None` for directories.
    fn get_stream(&mut self, index: usize) -> EngineResult<Option<Box<dyn InStream>>>;

    /// Opens item data for a specific operation.
    ///
    /// Operations that carry no new data resolve to `None` without touching
    /// [`UpdateCallback::get_stream`].
    fn get_stream2(
        &mut self,
        index: usize,
        op: UpdateOp,
    ) -> EngineResult<Option<Box<dyn InStream>>> {
        if op.needs_stream() {
            self.get_stream(index)
        } else {
            Ok(None)
        }
    }

    /// Reports the outcome for one item. A failure aborts the update.
    fn set_operation_result(&mut self, index: usize, result: OperationResult)
    -> EngineResult<()>;

    /// Password to encrypt with, or `None`.
    fn crypto_get_text_password(&mut self) -> EngineResult<Option<Password>>;

    /// Password query in the defined/undefined form: `(false, _)` means no
    /// encryption.
    fn crypto_get_text_password2(&mut self) -> EngineResult<(bool, Password)> {
        Ok(match self.crypto_get_text_password()? {
            Some(password) => (true, password),
            None => (false, Password::default()),
        })
    }
}

/// An opened archive of one format.
pub trait InArchive: Send {
    /// Parses the archive headers from `stream`.
    fn open(
        &mut self,
        stream: Box<dyn InStream>,
        callback: &mut dyn OpenCallback,
    ) -> EngineResult<()>;

    /// Number of items.
    fn item_count(&self) -> usize;

    /// One property of the item at `index`.
    fn item_property(&self, index: usize, id: PropId) -> EngineResult<PropValue>;

    /// One archive-level property.
    fn archive_property(&self, id: PropId) -> EngineResult<PropValue>;

    /// Extracts (or, with `test`, verifies) the items in `indices`, or every
    /// item when `None`. Per-item failures go to
    /// [`ExtractCallback::set_operation_result`]; an `Err` means the whole
    /// operation stopped.
    fn extract(
        &mut self,
        indices: Option<&[usize]>,
        test: bool,
        callback: &mut dyn ExtractCallback,
    ) -> EngineResult<()>;
}

/// Writer of one archive format.
pub trait OutArchive: Send {
    /// Applies generic `(name, value)` properties such as `"x"` (level).
    fn set_properties(&mut self, properties: &[(String, PropValue)]) -> EngineResult<()>;

    /// Writes `count` items, all provided by `callback`, into `out`.
    ///
    /// The stream is flushed and dropped before a successful return.
    fn update_items(
        &mut self,
        out: Box<dyn OutStream>,
        count: usize,
        callback: &mut dyn UpdateCallback,
    ) -> EngineResult<()>;
}

/// Runs a callback body at the engine boundary.
///
/// Crate errors become their engine code with the message kept; a panic
/// becomes [`EngineCode::E_FAIL`].
pub(crate) fn guard<T>(body: impl FnOnce() -> crate::Result<T>) -> EngineResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error.into()),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("panic in engine callback: {message}");
            Err(EngineFailure::new(EngineCode::E_FAIL, message))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Property names understood by [`OutArchive::set_properties`].
pub mod prop_names {
    /// Compression level, `U32` 0-9.
    pub const LEVEL: &str = "x";
    /// Solid mode, `Bool`.
    pub const SOLID: &str = "s";
    /// Dictionary size in bytes, `U32` or `U64`.
    pub const DICTIONARY: &str = "d";
    /// Worker thread count, `U32`.
    pub const THREADS: &str = "mt";
    /// Method name, `Str`.
    pub const METHOD: &str = "m";
    /// Encrypt headers, `Bool`.
    pub const ENCRYPT_HEADERS: &str = "he";
}
