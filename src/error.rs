use std::fmt::{self, Display};
use std::io;

use thiserror::Error;

/// The reason an entry failed its integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// The CRC32 of the decompressed data is not the one recorded in the archive.
    Checksum { expected: u32, actual: u32 },
    /// The decompressed data length is not the recorded uncompressed size.
    Size { expected: u64, actual: u64 },
    /// The compressed stream could not be decoded.
    Stream(String),
}

impl Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityFailure::Checksum { expected, actual } => write!(
                f,
                "CRC32 mismatch, expected {:08x} got {:08x}",
                expected, actual
            ),
            IntegrityFailure::Size { expected, actual } => write!(
                f,
                "size mismatch, expected {} bytes got {}",
                expected, actual
            ),
            IntegrityFailure::Stream(detail) => write!(f, "bad compressed stream: {}", detail),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid entry path '{name}' at offset {offset}: {reason}")]
    InvalidPath {
        name: String,
        offset: u64,
        reason: &'static str,
    },

    #[error("corrupt archive at offset {offset}: {detail}")]
    CorruptArchive { offset: u64, detail: String },

    #[error("corrupt entry '{name}' at offset {offset}: {detail}")]
    CorruptEntry {
        name: String,
        offset: u64,
        detail: String,
    },

    #[error("integrity error on entry '{name}' at offset {offset}: {failure}")]
    IntegrityError {
        name: String,
        offset: u64,
        failure: IntegrityFailure,
    },

    #[error("entry '{name}' at offset {offset} uses unsupported compression method {method}")]
    UnsupportedMethod {
        name: String,
        offset: u64,
        method: u16,
    },

    #[error("i/o error on entry '{name}' at offset {offset}: {source}")]
    EntryIo {
        name: String,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("archive i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub(crate) fn corrupt_archive<S: Into<String>>(offset: u64, detail: S) -> Self {
        ArchiveError::CorruptArchive {
            offset,
            detail: detail.into(),
        }
    }

    /// Name of the entry the error is about, when it concerns a single entry.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            ArchiveError::InvalidPath { name, .. }
            | ArchiveError::CorruptEntry { name, .. }
            | ArchiveError::IntegrityError { name, .. }
            | ArchiveError::UnsupportedMethod { name, .. }
            | ArchiveError::EntryIo { name, .. } => Some(name),
            ArchiveError::CorruptArchive { .. } | ArchiveError::Io(_) => None,
        }
    }

    /// Byte offset in the archive the error refers to, if known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            ArchiveError::InvalidPath { offset, .. }
            | ArchiveError::CorruptArchive { offset, .. }
            | ArchiveError::CorruptEntry { offset, .. }
            | ArchiveError::IntegrityError { offset, .. }
            | ArchiveError::UnsupportedMethod { offset, .. }
            | ArchiveError::EntryIo { offset, .. } => Some(*offset),
            ArchiveError::Io(_) => None,
        }
    }

    /// Fatal errors abort a whole-archive operation, the others only fail one entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArchiveError::CorruptArchive { .. } | ArchiveError::Io(_))
    }
}
