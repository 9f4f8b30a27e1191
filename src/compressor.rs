//! Whole-buffer and whole-file compression for single-stream formats.
//!
//! # Example
//!
//! ```rust
//! use szbridge::{ArchiveFormat, Compressor};
//!
//! let compressor = Compressor::new(ArchiveFormat::GZip)?.with_level(9)?;
//! let packed = compressor.compress(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")?;
//! assert_eq!(compressor.decompress(&packed)?, b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
//! # Ok::<(), szbridge::Error>(())
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::engine::single::{Codec, EncodeSettings, decode_failure};
use crate::format::ArchiveFormat;
use crate::{Error, Result, Timestamp};

/// Compresses and decompresses raw gzip, bzip2, xz or LZMA-alone streams.
#[derive(Debug, Clone)]
pub struct Compressor {
    codec: Codec,
    level: u32,
    threads: u32,
}

impl Compressor {
    /// Creates a compressor for `format` at the default level 5.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for formats that hold more than one item,
    /// [`Error::NotSupported`] for a stream format compiled out of this
    /// build.
    pub fn new(format: ArchiveFormat) -> Result<Self> {
        if !format.is_single_stream() {
            return Err(Error::InvalidArgument(format!(
                "{format} is not a single-stream format"
            )));
        }
        let codec = Codec::from_format(format)
            .ok_or_else(|| Error::not_supported(format!("{format} compression")))?;
        Ok(Self {
            codec,
            level: 5,
            threads: 1,
        })
    }

    /// Sets the compression level, 0-9.
    pub fn with_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidArgument(format!(
                "compression level must be 0-9, got {level}"
            )));
        }
        self.level = level;
        Ok(self)
    }

    /// Sets the encoder thread count; only xz makes use of it.
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Format produced and consumed.
    pub fn format(&self) -> ArchiveFormat {
        self.codec.format()
    }

    /// Compression level in use.
    pub fn level(&self) -> u32 {
        self.level
    }

    fn settings(&self) -> EncodeSettings {
        EncodeSettings {
            level: self.level,
            threads: self.threads,
            ..EncodeSettings::default()
        }
    }

    /// Compresses `data` into a complete stream.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let settings = EncodeSettings {
            size: Some(data.len() as u64),
            ..self.settings()
        };
        let mut encoder = self.codec.encoder(Vec::new(), &settings)?;
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    /// Decompresses a complete stream.
    ///
    /// # Errors
    ///
    /// A data error for input that is not a valid stream of this format.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decode(data, &mut out)?;
        Ok(out)
    }

    fn decode(&self, input: impl Read, out: &mut impl Write) -> Result<u64> {
        let context = format!("decompressing {}", self.format());
        let mut decoder = self
            .codec
            .decoder(input)
            .map_err(|e| decode_failure(e).into_error(&context))?;
        let mut buffer = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = match decoder.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(decode_failure(e).into_error(&context)),
            };
            out.write_all(&buffer[..n])?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Compresses the file at `input` into `output`. Returns the compressed
    /// size. A failed run removes `output`.
    pub fn compress_file(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<u64> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let source = File::open(input).map_err(|e| Error::io_at(e, input))?;
        let metadata = source.metadata().map_err(|e| Error::io_at(e, input))?;
        let settings = EncodeSettings {
            name: input.file_name().map(|n| n.to_string_lossy().into_owned()),
            modified: metadata.modified().ok().and_then(Timestamp::from_system_time),
            size: Some(metadata.len()),
            ..self.settings()
        };

        with_output(output, |sink| {
            let mut encoder = self.codec.encoder(sink, &settings)?;
            io::copy(&mut BufReader::new(source), &mut encoder)
                .map_err(|e| Error::io_at(e, input))?;
            encoder.finish()?.flush()?;
            Ok(())
        })?;
        let size = std::fs::metadata(output)
            .map_err(|e| Error::io_at(e, output))?
            .len();
        log::debug!(
            "compressed {} ({} bytes) into {} ({size} bytes)",
            input.display(),
            metadata.len(),
            output.display()
        );
        Ok(size)
    }

    /// Decompresses the file at `input` into `output`. Returns the
    /// decompressed size. A failed run removes `output`.
    pub fn decompress_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<u64> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let source = File::open(input).map_err(|e| Error::io_at(e, input))?;
        let mut written = 0;
        with_output(output, |mut sink| {
            written = self.decode(BufReader::new(source), &mut sink)?;
            sink.flush()?;
            Ok(())
        })?;
        Ok(written)
    }
}

/// Runs `body` against a fresh buffered `path`, removing the file if it fails.
fn with_output(path: &Path, body: impl FnOnce(BufWriter<File>) -> Result<()>) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io_at(e, path))?;
    let result = body(BufWriter::new(file));
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("cannot remove partial output {}: {e}", path.display());
        }
    }
    result
}
