//! Archive writing.
//!
//! <!--
//! This table shows how sizes that overflow 32 bits are recorded.
//!
//! <table>
//! <tr><th>Archive structure</th>
//! <td>Local file header</td>
//! <td>Central directory file header</td>
//! <td>End of central directory record</td>
//! </tr>
//! <tr><th>Size known in advance (large_file)</th>
//! <td>
//! <p>Sizes set to 0xFFFFFFFF</p>
//! <p>ZIP64 Extra Field: Yes, both sizes</p>
//! <p>Data Descriptor: No</p>
//! </td>
//! <td rowspan=2>
//! <p>Sizes and offset set to 0xFFFFFFFF if >= u32::MAX</p>
//! <p>ZIP64 Extra Field: only the saturated values</p>
//! </td>
//! <td rowspan=2>
//! <p>Zip64 format if
//! <ul>
//! <li>Number of entry >= u16::MAX OR</li>
//! <li>Central directory size or offset >= u32::MAX</li>
//! </ul>
//! </p>
//! </td>
//! </tr>
//! <tr><th>Size discovered while writing</th>
//! <td>
//! <p>Sizes set to 0, bit 3 of the flags set</p>
//! <p>Data Descriptor: ZIP64 format</p>
//! </td>
//! </tr>
//! </table>
//! -->

pub mod archive;
mod compressor;
mod parallel;
pub mod write_wrapper;

use crate::{
    compression::{CompressionMethod, Level},
    types::FileDateTime,
};

/// Metadata for a file to be archived
#[derive(Clone, Debug)]
pub struct FileOptions {
    /// The file's selected compression method.
    pub compression_method: CompressionMethod,

    /// The compression method's level.
    pub compression_level: Level,

    /// The file modified time.
    pub last_modified_time: FileDateTime,

    /// Unix permissions.
    pub unix_permissions: Option<u32>,

    /// File comment.
    pub comment: Option<String>,

    /// Indicator of file size > (u32::MAX)
    pub large_file: bool,

    /// Is the compressor will check the apparent file type
    pub detect_file_type: bool,

    /// Keep the Deflate output only when it is smaller than the input.
    pub store_if_larger: bool,
}

impl FileOptions {
    /// Set the compression method for the new file
    ///
    /// The default is `CompressionMethod::Deflate()`. `Lzma()` entries are
    /// written with an end of stream marker; files smaller than 512 bytes
    /// added from the filesystem are stored instead.
    pub fn compression_method(mut self, method: CompressionMethod) -> FileOptions {
        self.compression_method = method;
        self
    }

    /// Set the compression level for the new file
    pub fn compression_level(mut self, level: Level) -> FileOptions {
        self.compression_level = level;
        self
    }

    /// Set the last modified time
    ///
    /// The default is the current timestamp
    pub fn last_modified_time(mut self, mod_time: FileDateTime) -> FileOptions {
        self.last_modified_time = mod_time;
        self
    }

    /// Set the permissions for the new file.
    ///
    /// The format is represented with unix-style permissions.
    /// The default is `0o644`, which represents `rw-r--r--` for files,
    /// and `0o755`, which represents `rwxr-xr-x` for directories.
    ///
    /// This method only preserves the file permissions bits (via a `& 0o7777`) and discards
    /// higher file mode bits. So it cannot be used to denote an entry as a directory,
    /// symlink, or other special file type.
    pub fn unix_permissions(mut self, mode: u32) -> FileOptions {
        self.unix_permissions = Some(mode & 0o7777);
        self
    }

    /// Set the file comment.
    pub fn set_file_comment(mut self, comment: &str) -> FileOptions {
        self.comment = Some(comment.to_owned());
        self
    }

    /// Set whether the new file's compressed and uncompressed size is more than 4 GiB (0xFFFFFFFF bytes).
    ///
    /// If set to `false` and the file exceeds the limit, the sizes are written
    /// in a data descriptor after the data. If set to `true`, a Zip64 extra
    /// field is reserved in the local header and if the file does not exceed
    /// the limit, 20 B are wasted. The default is `false`.
    pub fn large_file(mut self, large: bool) -> FileOptions {
        self.large_file = large;
        self
    }

    /// Set an indicator to the archiver to detect the entry file type.
    ///
    /// The archiver will read first bytes of the entry to detect if it is a plain text or
    ///  a binary file.
    ///
    /// More information detailed there: [txtvsbin.txt](https://github.com/LuaDist/zip/blob/master/proginfo/txtvsbin.txt)
    ///
    /// Default value: true
    pub fn detect_file_type(mut self, detect_file_type: bool) -> FileOptions {
        self.detect_file_type = detect_file_type;
        self
    }

    /// Fall back to `Store()` when compression does not shrink a seekable payload.
    ///
    /// Default value: true
    pub fn store_if_larger(mut self, store_if_larger: bool) -> FileOptions {
        self.store_if_larger = store_if_larger;
        self
    }
}

impl FileOptions {
    /// The method the payload is really written with.
    pub(crate) fn effective_compression_method(&self) -> CompressionMethod {
        match self.compression_level {
            Level::None => CompressionMethod::Store(),
            _ => self.compression_method,
        }
    }
}

impl Default for FileOptions {
    /// Construct a new FileOptions object
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflate(),
            compression_level: Level::Default,
            last_modified_time: FileDateTime::Now,
            unix_permissions: None,
            comment: None,
            large_file: false,
            detect_file_type: true,
            store_if_larger: true,
        }
    }
}
