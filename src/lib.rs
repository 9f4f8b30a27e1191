//! # szbridge
//!
//! Read, create and test 7z, zip and tar archives and gzip, bzip2, xz and
//! LZMA streams through one API, from Rust or from C.
//!
//! Archives open from files, from split volume sets (`name.7z.001`, ...) or
//! from memory; the format is detected from the content, with the file
//! extension as a fallback. Writers collect items and produce the archive in
//! a single [`ArchiveWriter::finalize`] call.
//!
//! ## Quick Start
//!
//! ### Extracting an Archive
//!
//! ```rust,no_run
//! use szbridge::{ArchiveReader, Result};
//!
//! fn main() -> Result<()> {
//!     let mut reader = ArchiveReader::open("archive.7z")?;
//!
//!     for item in reader.items()? {
//!         println!("{}: {} bytes", item.path, item.size);
//!     }
//!
//!     let summary = reader.extract_all("./output")?;
//!     println!("{} extracted, {} failed", summary.items_extracted, summary.items_failed);
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use szbridge::{ArchiveFormat, ArchiveWriter, Result};
//!
//! fn main() -> Result<()> {
//!     let mut writer = ArchiveWriter::create("new.7z", ArchiveFormat::SevenZip)?.with_level(7)?;
//!     writer.add_file("file.txt")?;
//!     writer.add_buffer("hello.txt", b"Hello, World!".as_slice())?;
//!     writer.finalize()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Passwords
//!
//! ```rust,no_run
//! use szbridge::{ArchiveFormat, ArchiveReader, ArchiveWriter};
//!
//! let mut writer = ArchiveWriter::create("secret.7z", ArchiveFormat::SevenZip)?;
//! writer.set_password("secret")?;
//! writer.set_encrypt_headers(true)?;
//! writer.add_buffer("plan.txt", b"attack at dawn".as_slice())?;
//! writer.finalize()?;
//!
//! let mut reader = ArchiveReader::open_with_password("secret.7z", "secret")?;
//! assert_eq!(reader.extract_to_memory(0)?, b"attack at dawn");
//! # Ok::<(), szbridge::Error>(())
//! ```
//!
//! ### Single Streams
//!
//! ```rust
//! use szbridge::{ArchiveFormat, Compressor};
//!
//! let xz = Compressor::new(ArchiveFormat::Xz)?;
//! let packed = xz.compress(b"some text")?;
//! assert_eq!(xz.decompress(&packed)?, b"some text");
//! # Ok::<(), szbridge::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | xz and LZMA streams |
//! | `deflate` | Yes | gzip streams and Deflate in zip |
//! | `bzip2` | Yes | bzip2 streams and BZip2 in zip |
//! | `aes` | Yes | AES-256 encryption in 7z and zip |
//!
//! ## Error Handling
//!
//! Every fallible call returns [`Result<T>`]. [`Error::code`] gives a stable
//! [`ErrorCode`] and [`Error::kind`] its category:
//!
//! ```rust,no_run
//! use szbridge::{ArchiveReader, ErrorKind};
//!
//! match ArchiveReader::open("maybe.7z") {
//!     Ok(reader) => println!("{} items", reader.item_count()),
//!     Err(e) if e.kind() == ErrorKind::Password => eprintln!("needs a password"),
//!     Err(e) if e.is_format() => eprintln!("not an archive: {e}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## C ABI
//!
//! Built as a `cdylib`, the crate exports the `sz_*` functions of the
//! [`ffi`] module.
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`] facade; install any logger to see them.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod archive_path;
pub mod compressor;
pub mod convenience;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod format;
pub mod password;
pub mod progress;
pub mod property;
pub mod read;
pub mod stream;
pub mod timestamp;
pub mod write;

pub use archive_path::ArchivePath;
pub use compressor::Compressor;
pub use error::{Error, ErrorCode, ErrorKind, Result};
pub use format::{
    ArchiveFormat, FormatInfo, detect_format, detect_format_from_bytes, guess_format_from_extension,
};
pub use password::Password;
pub use timestamp::Timestamp;

pub use read::{
    ArchiveInfo, ArchiveItemInfo, ArchiveReader, ExtractOptions, ExtractSummary, OverwritePolicy,
};
pub use write::{ArchiveProperties, ArchiveWriter, CompressionLevel, CompressionMethod};

pub use progress::{AtomicProgress, NoProgress, ProgressReporter, ThrottledProgress, progress_fn};

/// Registers the format handlers.
///
/// Idempotent and thread-safe. Every entry point calls it, so calling it
/// up front only moves the one-time cost.
pub fn init() {
    engine::init();
}
