//! Archive creation settings.

use crate::engine::prop_names;
use crate::format::ArchiveFormat;
use crate::property::PropValue;
use crate::{Error, Password, Result};

/// Named compression levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// Store without compression.
    None = 0,
    /// Fastest compression.
    Fastest = 1,
    /// Fast compression.
    Fast = 3,
    /// Balanced speed and ratio.
    #[default]
    Normal = 5,
    /// High compression.
    Maximum = 7,
    /// Highest compression.
    Ultra = 9,
}

impl CompressionLevel {
    /// Numeric level, 0-9.
    pub const fn value(self) -> u32 {
        self as u32
    }
}

impl From<CompressionLevel> for u32 {
    fn from(level: CompressionLevel) -> Self {
        level.value()
    }
}

/// Compression methods, named the way the engine expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// LZMA (7z).
    Lzma,
    /// LZMA2 (7z default).
    Lzma2,
    /// PPMd.
    Ppmd,
    /// BZip2 (zip).
    BZip2,
    /// Deflate (zip default).
    Deflate,
    /// No compression.
    Copy,
}

impl CompressionMethod {
    /// Method name as passed in the `m` property.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lzma => "LZMA",
            Self::Lzma2 => "LZMA2",
            Self::Ppmd => "PPMd",
            Self::BZip2 => "BZip2",
            Self::Deflate => "Deflate",
            Self::Copy => "Copy",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings applied to the engine right before an archive is written.
///
/// Solid mode and header encryption only exist in 7z; for other formats
/// they are dropped with a warning when the archive is written.
///
/// # Example
///
/// ```rust
/// use szbridge::write::{ArchiveProperties, CompressionMethod};
///
/// let props = ArchiveProperties::new()
///     .level(9)?
///     .method(CompressionMethod::Lzma2)
///     .solid(false)
///     .password("secret")
///     .encrypt_headers(true);
/// assert_eq!(props.level_value(), 9);
/// # Ok::<(), szbridge::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct ArchiveProperties {
    /// Compression level, 0-9; `None` keeps the format's default.
    pub level: Option<u32>,
    /// Compression method; `None` keeps the format's default.
    pub method: Option<CompressionMethod>,
    /// Dictionary size in bytes.
    pub dictionary_size: Option<u32>,
    /// Solid mode (7z); `None` means on.
    pub solid: Option<bool>,
    /// Encoder threads.
    pub threads: Option<u32>,
    /// Password to encrypt item data with.
    pub password: Option<Password>,
    /// Encrypt the item listing too (7z, needs a password).
    pub encrypt_headers: bool,
    /// Split the written archive into volumes of this many bytes.
    pub volume_size: Option<u64>,
}

impl std::fmt::Debug for ArchiveProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveProperties")
            .field("level", &self.level)
            .field("method", &self.method)
            .field("dictionary_size", &self.dictionary_size)
            .field("solid", &self.solid)
            .field("threads", &self.threads)
            .field("password", &self.password.is_some())
            .field("encrypt_headers", &self.encrypt_headers)
            .field("volume_size", &self.volume_size)
            .finish()
    }
}

impl ArchiveProperties {
    /// Creates default properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for levels above 9.
    pub fn level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidArgument(format!(
                "compression level must be 0-9, got {level}"
            )));
        }
        self.level = Some(level);
        Ok(self)
    }

    /// Sets the compression level, clamping it to 0-9.
    pub fn level_clamped(mut self, level: u32) -> Self {
        self.level = Some(level.min(9));
        self
    }

    /// Sets a named compression level.
    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.level = Some(level.value());
        self
    }

    /// Sets the compression method.
    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the dictionary size in bytes.
    pub fn dictionary_size(mut self, size: u32) -> Self {
        self.dictionary_size = Some(size);
        self
    }

    /// Enables or disables solid mode.
    pub fn solid(mut self, solid: bool) -> Self {
        self.solid = Some(solid);
        self
    }

    /// Sets the number of encoder threads.
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enables or disables header encryption.
    pub fn encrypt_headers(mut self, encrypt: bool) -> Self {
        self.encrypt_headers = encrypt;
        self
    }

    /// Sets the volume size in bytes.
    pub fn volume_size(mut self, size: u64) -> Self {
        self.volume_size = Some(size);
        self
    }

    /// Effective compression level.
    pub fn level_value(&self) -> u32 {
        self.level.unwrap_or(CompressionLevel::Normal.value())
    }

    /// Effective solid flag.
    pub fn is_solid(&self) -> bool {
        self.solid.unwrap_or(true)
    }

    /// Translates the settings into the engine's name/value list for
    /// `format`, dropping those the format has no use for.
    pub(crate) fn engine_properties(&self, format: ArchiveFormat) -> Vec<(String, PropValue)> {
        let mut props: Vec<(&str, PropValue)> = Vec::new();
        if let Some(level) = self.level {
            props.push((prop_names::LEVEL, level.into()));
        }
        if let Some(method) = self.method {
            props.push((prop_names::METHOD, method.name().into()));
        }
        if let Some(size) = self.dictionary_size {
            props.push((prop_names::DICTIONARY, size.into()));
        }
        if let Some(threads) = self.threads {
            props.push((prop_names::THREADS, threads.into()));
        }
        if format == ArchiveFormat::SevenZip || self.solid.is_some() {
            props.push((prop_names::SOLID, self.is_solid().into()));
        }
        if self.encrypt_headers {
            props.push((prop_names::ENCRYPT_HEADERS, true.into()));
        }

        props
            .into_iter()
            .filter(|(name, value)| {
                let accepted = accepts(format, name);
                if !accepted {
                    if matches!(*name, prop_names::SOLID | prop_names::ENCRYPT_HEADERS) {
                        log::warn!("{name}={value} only applies to 7z archives; ignored for {format}");
                    } else {
                        log::debug!("{format} writer takes no {name}; dropping {value}");
                    }
                }
                accepted
            })
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

/// Whether the writer for `format` understands property `name`.
fn accepts(format: ArchiveFormat, name: &str) -> bool {
    use prop_names::*;
    match format {
        ArchiveFormat::SevenZip => true,
        ArchiveFormat::Zip => matches!(name, LEVEL | METHOD | THREADS | DICTIONARY),
        ArchiveFormat::Tar => matches!(name, LEVEL | METHOD | THREADS),
        _ => matches!(name, LEVEL | METHOD | THREADS | DICTIONARY),
    }
}
