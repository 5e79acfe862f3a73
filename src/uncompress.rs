//! Reading archives.
//!
//! [`ArchiveReader`] finds the end of central directory record, loads the
//! central directory once and decodes its records on demand. Entries are then
//! verified and extracted one by one; a failing entry never stops the others.
//!
//! ```no_run
//! use ziptree::uncompress::ArchiveReader;
//!
//! let mut archive = ArchiveReader::open("archive.zip")?;
//! let report = archive.extract_all("output")?;
//! println!("{}", report);
//! # Ok::<(), ziptree::error::ArchiveError>(())
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::archive_common::{
    parse_central_directory_file_header, ArchiveDescriptorReader, CentralDirectoryEnd,
};
use crate::constants::{CENTRAL_DIRECTORY_END_SIGNATURE, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE};
use crate::error::ArchiveError;
use crate::report::TaskReport;
use crate::types::ArchiveFileEntry;

mod decompressor;
mod extract;

pub use decompressor::{decompressor, LzmaProperties};
pub use extract::extract_archive_parallel;

/// How entries are written to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub(crate) overwrite: bool,
    pub(crate) restore_permissions: bool,
    pub(crate) restore_modification_time: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            restore_permissions: true,
            restore_modification_time: true,
        }
    }
}

impl ExtractOptions {
    /// Replace files already present at the destination.
    ///
    /// Off by default: an existing file makes its entry fail.
    pub fn overwrite(mut self, overwrite: bool) -> ExtractOptions {
        self.overwrite = overwrite;
        self
    }

    /// Apply the permission bits stored in the archive. When off, or when the
    /// entry has none, files get `0644` and directories `0755`.
    pub fn restore_permissions(mut self, restore: bool) -> ExtractOptions {
        self.restore_permissions = restore;
        self
    }

    pub fn restore_modification_time(mut self, restore: bool) -> ExtractOptions {
        self.restore_modification_time = restore;
        self
    }
}

/// A Zip archive open for reading.
pub struct ArchiveReader<R: Read + Seek = File> {
    reader: R,
    central_directory_end: CentralDirectoryEnd,
    central_directory: Vec<u8>,
    options: ExtractOptions,
}

impl ArchiveReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ArchiveReader<File>, ArchiveError> {
        let file = File::open(path)?;
        ArchiveReader::new(file)
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Read the trailer and the central directory of the archive held by `reader`.
    pub fn new(mut reader: R) -> Result<ArchiveReader<R>, ArchiveError> {
        let central_directory_end = locate_central_directory_end(&mut reader)?;

        reader.seek(SeekFrom::Start(
            central_directory_end.offset_of_start_of_central_directory,
        ))?;
        let mut central_directory = vec![0; central_directory_end.central_directory_size as usize];
        reader.read_exact(&mut central_directory).map_err(|e| {
            ArchiveError::corrupt_archive(
                central_directory_end.offset_of_start_of_central_directory,
                format!("central directory cannot be read: {}", e),
            )
        })?;

        debug!(
            "central directory: {} entries, {} bytes at {}",
            central_directory_end.total_number_of_entries_in_the_central_directory,
            central_directory_end.central_directory_size,
            central_directory_end.offset_of_start_of_central_directory
        );

        Ok(ArchiveReader {
            reader,
            central_directory_end,
            central_directory,
            options: ExtractOptions::default(),
        })
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_extract_options(&mut self, options: ExtractOptions) {
        self.options = options;
    }

    /// Number of entries announced by the trailer.
    pub fn len(&self) -> u64 {
        self.central_directory_end
            .total_number_of_entries_in_the_central_directory
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the archive ends with a Zip64 trailer.
    pub fn is_zip64(&self) -> bool {
        self.central_directory_end.zip64
    }

    pub fn comment(&self) -> Option<String> {
        self.central_directory_end
            .archive_comment
            .as_ref()
            .map(|comment| String::from_utf8_lossy(comment).into_owned())
    }

    /// Entries in central directory order.
    ///
    /// Records are decoded as the iterator advances; a malformed record yields
    /// one `CorruptArchive` error and ends the iteration.
    pub fn list_entries(&self) -> Entries<'_> {
        Entries {
            indexer: ArchiveDescriptorReader::new(&self.central_directory),
            base_offset: self.central_directory_end.offset_of_start_of_central_directory,
            remaining: self.len(),
            done: false,
        }
    }

    /// Decompress `entry` into `writer`, checking its size and CRC32.
    ///
    /// Returns the number of bytes written.
    pub fn read_entry<W: Write + ?Sized>(
        &mut self,
        entry: &ArchiveFileEntry,
        writer: &mut W,
    ) -> Result<u64, ArchiveError> {
        extract::read_entry_from(&mut self.reader, entry, writer)
    }

    /// Extract a single entry below `destination` and return the path written.
    pub fn extract<P: AsRef<Path>>(
        &mut self,
        entry: &ArchiveFileEntry,
        destination: P,
    ) -> Result<PathBuf, ArchiveError> {
        extract::extract_entry_from(
            &mut self.reader,
            0,
            entry,
            destination.as_ref(),
            &self.options,
            None,
        )
    }

    /// Extract every entry below `destination`.
    ///
    /// Entry failures are recorded in the report; only a damaged central
    /// directory or a destination that cannot be created fails the call.
    pub fn extract_all<P: AsRef<Path>>(&mut self, destination: P) -> Result<TaskReport, ArchiveError> {
        let destination = destination.as_ref();
        std::fs::create_dir_all(destination)?;

        let entries = self.list_entries().collect::<Result<Vec<_>, _>>()?;
        let mut directories = Vec::new();
        let mut report = TaskReport::default();

        for (index, entry) in entries.iter().enumerate() {
            match extract::extract_entry_from(
                &mut self.reader,
                index,
                entry,
                destination,
                &self.options,
                Some(&mut directories),
            ) {
                Ok(_) => report.record_success(index, &entry.name),
                Err(error) => report.record_failure(index, &entry.name, error),
            }
        }

        extract::apply_directory_permissions(directories, &mut report);
        Ok(report)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Lazy iterator over the central directory records of an archive.
pub struct Entries<'a> {
    indexer: ArchiveDescriptorReader<'a>,
    base_offset: u64,
    remaining: u64,
    done: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<ArchiveFileEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }

        let offset = self.base_offset + self.indexer.get_index() as u64;
        match parse_central_directory_file_header(&mut self.indexer) {
            Some(entry) => {
                self.remaining -= 1;
                Some(Ok(entry))
            }
            None => {
                self.done = true;
                Some(Err(ArchiveError::corrupt_archive(
                    offset,
                    "truncated or malformed central directory record",
                )))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, usize::try_from(self.remaining).ok())
        }
    }
}

/// Scan backward for the end of central directory record, then follow the
/// Zip64 locator when there is one.
fn locate_central_directory_end<R: Read + Seek>(
    reader: &mut R,
) -> Result<CentralDirectoryEnd, ArchiveError> {
    let file_length = reader.seek(SeekFrom::End(0))?;
    if file_length < CentralDirectoryEnd::BASE_SIZE {
        return Err(ArchiveError::corrupt_archive(0, "archive too small"));
    }

    let window = file_length.min(CentralDirectoryEnd::BASE_SIZE + u16::MAX as u64);
    let window_start = file_length - window;
    reader.seek(SeekFrom::Start(window_start))?;
    let mut tail = vec![0; window as usize];
    reader.read_exact(&mut tail)?;

    let signature = CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes();
    let mut position = tail.len() - CentralDirectoryEnd::BASE_SIZE as usize;
    let (record_position, mut central_directory_end) = loop {
        if tail[position..position + 4] == signature {
            if let Some(end) = CentralDirectoryEnd::parse_end_of_central_directory(&tail[position..]) {
                break (window_start + position as u64, end);
            }
        }
        position = match position.checked_sub(1) {
            Some(p) => p,
            None => {
                return Err(ArchiveError::corrupt_archive(
                    file_length,
                    "end of central directory record not found",
                ))
            }
        };
    };
    debug!("end of central directory record at {}", record_position);

    // Upper bound of the central directory: the first trailer record.
    let mut central_directory_limit = record_position;

    if let Some(locator_position) = record_position.checked_sub(CentralDirectoryEnd::LOCATOR_SIZE) {
        let mut locator = [0u8; CentralDirectoryEnd::LOCATOR_SIZE as usize];
        reader.seek(SeekFrom::Start(locator_position))?;
        reader.read_exact(&mut locator)?;

        if locator[..4] == ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE.to_le_bytes() {
            let (_, zip64_record_position, _) =
                CentralDirectoryEnd::parse_zip64_end_of_central_directory_locator(&locator)
                    .ok_or_else(|| {
                        ArchiveError::corrupt_archive(locator_position, "bad zip64 locator")
                    })?;

            let record_end = zip64_record_position.checked_add(CentralDirectoryEnd::RECORD_SIZE);
            if !matches!(record_end, Some(end) if end <= locator_position) {
                return Err(ArchiveError::corrupt_archive(
                    locator_position,
                    "zip64 locator points past itself",
                ));
            }

            let mut record = [0u8; CentralDirectoryEnd::RECORD_SIZE as usize];
            reader.seek(SeekFrom::Start(zip64_record_position))?;
            reader.read_exact(&mut record)?;
            central_directory_end
                .merge_zip64_end_of_central_directory_record(&record)
                .ok_or_else(|| {
                    ArchiveError::corrupt_archive(
                        zip64_record_position,
                        "zip64 end of central directory record not found",
                    )
                })?;
            central_directory_end
                .z64ecdl_relative_offset_of_the_zip64_end_of_central_directory_record =
                zip64_record_position;
            central_directory_limit = zip64_record_position;
        } else if central_directory_end.needs_zip64_format_extensions() {
            warn!("saturated end of central directory record without zip64 locator");
        }
    }

    if central_directory_end.number_of_this_disk != 0
        || central_directory_end.number_of_the_disk_with_central_directory != 0
    {
        return Err(ArchiveError::corrupt_archive(
            record_position,
            "multi-volume archives are not supported",
        ));
    }

    let central_directory_end_offset = central_directory_end
        .offset_of_start_of_central_directory
        .checked_add(central_directory_end.central_directory_size);
    match central_directory_end_offset {
        Some(end) if end <= central_directory_limit => Ok(central_directory_end),
        _ => Err(ArchiveError::corrupt_archive(
            record_position,
            format!(
                "central directory ({} bytes at {}) overruns the trailer",
                central_directory_end.central_directory_size,
                central_directory_end.offset_of_start_of_central_directory
            ),
        )),
    }
}

/// Extract every entry of the archive at `archive_path` below `destination`.
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    destination: Q,
) -> Result<TaskReport, ArchiveError> {
    ArchiveReader::open(archive_path)?.extract_all(destination)
}

/// Report the failure of reading `entry` from the archive itself.
pub(crate) fn entry_io_error(entry: &ArchiveFileEntry, source: io::Error) -> ArchiveError {
    ArchiveError::EntryIo {
        name: entry.name.clone(),
        offset: entry.local_header_offset,
        source,
    }
}
