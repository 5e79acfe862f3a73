use std::fmt::Display;

pub const STORE: u16 = 0;
pub const DEFLATE: u16 = 8;
pub const LZMA: u16 = 14;

/// Compression method of an archive entry, keyed by its Zip method code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store(),
    Deflate(),
    Lzma(),
    Unknown(u16),
}

impl CompressionMethod {
    pub fn zip_code(&self) -> u16 {
        match self {
            CompressionMethod::Store() => STORE,
            CompressionMethod::Deflate() => DEFLATE,
            CompressionMethod::Lzma() => LZMA,
            CompressionMethod::Unknown(code) => *code,
        }
    }

    pub fn zip_version_needed(&self) -> u16 {
        // higher versions matched first
        match self {
            CompressionMethod::Lzma() => 63,
            CompressionMethod::Deflate() => 20,
            _ => 10,
        }
    }

    pub fn from_compression_method(compression_method: u16) -> CompressionMethod {
        match compression_method {
            STORE => CompressionMethod::Store(),
            DEFLATE => CompressionMethod::Deflate(),
            LZMA => CompressionMethod::Lzma(),
            _ => CompressionMethod::Unknown(compression_method),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CompressionMethod::Store() => "store",
            CompressionMethod::Deflate() => "deflate",
            CompressionMethod::Lzma() => "lzma",
            CompressionMethod::Unknown(_) => "unknown",
        }
    }

    /// Whether entries with this method can be written by the archive writer.
    pub fn can_compress(&self) -> bool {
        !self.is_unknown()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CompressionMethod::Unknown(_))
    }
}

impl Default for CompressionMethod {
    fn default() -> Self {
        CompressionMethod::Deflate()
    }
}

impl Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionMethod::Unknown(code) => write!(f, "unknown ({})", code),
            _ => write!(f, "{}", self.label()),
        }
    }
}

/// Level of compression data should be compressed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Level {
    /// Fastest quality of compression, usually produces bigger size.
    Fastest,
    /// Best quality of compression, usually produces the smallest size.
    Best,
    /// Default quality of compression defined by the selected compression algorithm.
    #[default]
    Default,
    /// Precise quality based on the underlying compression algorithms'
    /// qualities. The interpretation of this depends on the algorithm chosen
    /// and the specific implementation backing it.
    /// Qualities are implicitly clamped to the algorithm's maximum.
    Precise(u32),
    /// No compression, the data is stored.
    None,
}

impl Level {
    /// The liblzma preset of this level.
    pub fn lzma_preset(&self) -> u32 {
        match self {
            Level::Fastest => 1,
            Level::Best => 9,
            Level::Default => 6,
            Level::Precise(val) => (*val).min(9),
            Level::None => 0,
        }
    }
}

impl From<Level> for flate2::Compression {
    fn from(level: Level) -> Self {
        match level {
            Level::Fastest => flate2::Compression::fast(),
            Level::Best => flate2::Compression::best(),
            Level::Default => flate2::Compression::default(),
            Level::Precise(val) => flate2::Compression::new(val.min(9)),
            Level::None => flate2::Compression::none(),
        }
    }
}
