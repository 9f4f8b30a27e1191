//! Process-wide table of format handlers.

use std::sync::OnceLock;

use super::{InArchive, OutArchive};
use crate::format::ArchiveFormat;
use crate::{Error, Result};

type InFactory = fn() -> Box<dyn InArchive>;
type OutFactory = fn() -> Box<dyn OutArchive>;

struct Handler {
    format: ArchiveFormat,
    reader: InFactory,
    writer: OutFactory,
}

struct Registry {
    handlers: Vec<Handler>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn build() -> Registry {
    let mut handlers = vec![
        Handler {
            format: ArchiveFormat::SevenZip,
            reader: || Box::new(super::sevenz::SevenZipIn::default()),
            writer: || Box::new(super::sevenz::SevenZipOut::default()),
        },
        Handler {
            format: ArchiveFormat::Zip,
            reader: || Box::new(super::zip_archive::ZipIn::default()),
            writer: || Box::new(super::zip_archive::ZipOut::default()),
        },
        Handler {
            format: ArchiveFormat::Tar,
            reader: || Box::new(super::tar_archive::TarIn::default()),
            writer: || Box::new(super::tar_archive::TarOut::default()),
        },
    ];
    for codec in super::single::Codec::available() {
        handlers.push(Handler {
            format: codec.format(),
            reader: codec.in_factory(),
            writer: codec.out_factory(),
        });
    }
    log::debug!("registered {} archive handlers", handlers.len());
    Registry { handlers }
}

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(build)
}

fn handler(format: ArchiveFormat) -> Result<&'static Handler> {
    registry()
        .handlers
        .iter()
        .find(|h| h.format == format)
        .ok_or_else(|| Error::unsupported_format(format!("no handler for {format} archives")))
}

/// Initializes the handler table. Idempotent and thread-safe; every entry
/// point calls it implicitly.
pub fn init() {
    registry();
}

/// Returns true when archives of `format` can be opened and created.
pub fn has_handler(format: ArchiveFormat) -> bool {
    handler(format).is_ok()
}

/// Creates a reader for `format`.
pub fn create_in_archive(format: ArchiveFormat) -> Result<Box<dyn InArchive>> {
    Ok((handler(format)?.reader)())
}

/// Creates a writer for `format`.
pub fn create_out_archive(format: ArchiveFormat) -> Result<Box<dyn OutArchive>> {
    Ok((handler(format)?.writer)())
}
