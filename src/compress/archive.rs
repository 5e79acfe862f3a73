use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use log::{debug, warn};
use walkdir::WalkDir;

use super::compressor::{compress, CompressResult, CompressedFile};
use super::write_wrapper::{ArchiveSink, WriteSeekWrapper};
use crate::archive_common::{
    build_central_directory_file_header, build_file_header, ArchiveDescriptor,
    CentralDirectoryEnd,
};
use crate::compress::FileOptions;
use crate::compression::{CompressionMethod, Level};
use crate::constants::{
    DATA_DESCRIPTOR_SIGNATURE, DEFAULT_DIRECTORY_PERMISSIONS, DEFAULT_FILE_PERMISSIONS,
    EXTENDED_LOCAL_HEADER_FLAG, LZMA_END_OF_STREAM_FLAG, LZMA_MIN_FILE_SIZE,
    MSDOS_DIRECTORY_ATTRIBUTE, S_IFDIR, S_IFLNK, S_IFREG, UTF8_NAME_FLAG, VERSION_MADE_BY,
    VERSION_NEEDED_ZIP64,
};
use crate::error::ArchiveError;
use crate::extra_field::{
    ExtraFieldAsiUnix, ExtraFieldExtendedTimestamp, ExtraFieldZIP64ExtendedInformation,
    ExtraFields,
};
use crate::path::{join_archive_name, validate_entry_name};
use crate::types::{ArchiveFileEntry, FileDateTime};

/// Sizes above this are written with a Zip64 local extra field from the start.
const ZIP64_RESERVE_THRESHOLD: u64 = u32::MAX as u64 - (1 << 20);

/// A zip archive writer.
///
/// Create the archive with [`create`](Self::create()) or [`new`](Self::new()),
/// add filesystem trees with [`add`](Self::add()) or
/// [`add_parallel`](Self::add_parallel()), single entries with
/// [`append`](Self::append()), then call [`finalize`](Self::finalize()).
///
/// Every local header is written with a fixed length and patched in place once
/// the entry data is written, so the sink must be seekable.
pub struct ArchiveWriter<W: ArchiveSink = File> {
    sink: WriteSeekWrapper<W>,
    entries: Vec<ArchiveFileEntry>,
    central_directory_end: CentralDirectoryEnd,
    options: FileOptions,
}

/// How the entry payload must be produced.
enum Payload<'r> {
    Empty,
    Stream(&'r mut dyn Read),
    Rewindable(&'r mut File),
    Compressed(CompressedFile),
}

/// A directory, file or symbolic link found below a source path.
pub(crate) struct SourceEntry {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) metadata: fs::Metadata,
}

impl SourceEntry {
    pub(crate) fn is_file(&self) -> bool {
        self.metadata.file_type().is_file()
    }
}

impl ArchiveWriter<File> {
    /// Create a new archive file. An existing file is never overwritten.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<ArchiveWriter<File>, ArchiveError> {
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path.as_ref())?;
        debug!("creating archive {}", path.as_ref().display());
        Ok(ArchiveWriter::new(file))
    }
}

impl<W: ArchiveSink> ArchiveWriter<W> {
    /// Create a new zip archive, using the underlying [`Write`] + [`Seek`] to
    /// write files' header and payload.
    pub fn new(sink: W) -> ArchiveWriter<W> {
        ArchiveWriter {
            sink: WriteSeekWrapper::new(sink),
            entries: Vec::new(),
            central_directory_end: CentralDirectoryEnd::default(),
            options: FileOptions::default(),
        }
    }

    /// Options used by [`add`](Self::add()) for regular files.
    pub fn with_options(mut self, options: FileOptions) -> Self {
        self.options = options;
        self
    }

    /// Get archive current total bytes written.
    pub fn get_archive_size(&self) -> u64 {
        self.sink.get_written_bytes_count()
    }

    /// Entries written so far, in archive order.
    pub fn entries(&self) -> &[ArchiveFileEntry] {
        &self.entries
    }

    ///Set the archive comment
    pub fn set_archive_comment(&mut self, comment: &str) {
        self.central_directory_end.set_archive_comment(comment);
    }

    fn check_name(&self, archive_name: &str) -> Result<String, ArchiveError> {
        validate_entry_name(archive_name).map_err(|reason| ArchiveError::InvalidPath {
            name: archive_name.to_owned(),
            offset: self.sink.get_written_bytes_count(),
            reason,
        })
    }

    /// Add the filesystem tree rooted at `source_path` under `archive_name`.
    ///
    /// Directories are walked in file name order and symbolic links are
    /// stored, not followed. Returns the number of entries added.
    ///
    /// An invalid `archive_name` fails the call before anything is written.
    pub fn add<P: AsRef<Path>>(
        &mut self,
        source_path: P,
        archive_name: &str,
    ) -> Result<usize, ArchiveError> {
        let sources = self.walk_source(source_path.as_ref(), archive_name)?;
        for source in &sources {
            self.append_source(source, None)?;
        }
        Ok(sources.len())
    }

    /// List what [`add`](Self::add()) would write, in archive order.
    pub(crate) fn walk_source(
        &self,
        source_path: &Path,
        archive_name: &str,
    ) -> Result<Vec<SourceEntry>, ArchiveError> {
        let root_name = self.check_name(archive_name)?;
        let root_name = root_name.trim_end_matches('/');
        let mut sources = Vec::new();

        for dir_entry in WalkDir::new(source_path)
            .follow_links(false)
            .sort_by_file_name()
        {
            let dir_entry = dir_entry.map_err(|error| {
                let name = error
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| source_path.display().to_string());
                self.entry_io(&name, io::Error::from(error))
            })?;

            let relative = dir_entry
                .path()
                .strip_prefix(source_path)
                .unwrap_or_else(|_| Path::new(""));
            let name = self.check_name(&join_archive_name(root_name, relative))?;
            let file_type = dir_entry.file_type();
            if !(file_type.is_dir() || file_type.is_file() || file_type.is_symlink()) {
                warn!("skipping {}: not a file, directory or symlink", name);
                continue;
            }

            let metadata = dir_entry
                .metadata()
                .map_err(|error| self.entry_io(&name, io::Error::from(error)))?;
            sources.push(SourceEntry {
                path: dir_entry.into_path(),
                name,
                metadata,
            });
        }

        Ok(sources)
    }

    /// Options of `source`: the writer options with its time, permissions and size.
    pub(crate) fn source_options(&self, source: &SourceEntry) -> FileOptions {
        let metadata = &source.metadata;
        let mut options = self.options.clone().last_modified_time(
            metadata
                .modified()
                .map(FileDateTime::System)
                .unwrap_or(FileDateTime::Now),
        );
        if let Some(mode) = permissions_of(metadata) {
            options = options.unix_permissions(mode);
        }

        if source.is_file() {
            options = options
                .large_file(self.options.large_file || metadata.len() >= ZIP64_RESERVE_THRESHOLD);
            if options.compression_method == CompressionMethod::Lzma()
                && metadata.len() < LZMA_MIN_FILE_SIZE
            {
                options = options.compression_method(CompressionMethod::Store());
            }
        }
        options
    }

    /// Write `source`, from `compressed` when its data was compressed ahead.
    pub(crate) fn append_source(
        &mut self,
        source: &SourceEntry,
        compressed: Option<CompressedFile>,
    ) -> Result<(), ArchiveError> {
        let options = self.source_options(source);
        let file_type = source.metadata.file_type();

        if file_type.is_dir() {
            self.append_directory(&source.name, &options)
        } else if file_type.is_symlink() {
            let target =
                fs::read_link(&source.path).map_err(|error| self.entry_io(&source.name, error))?;
            self.append_symlink(&source.name, &target.to_string_lossy(), &options)
        } else {
            match compressed {
                Some(compressed) => self.write_entry(
                    &source.name,
                    &options,
                    S_IFREG,
                    Payload::Compressed(compressed),
                ),
                None => {
                    let mut file = File::open(&source.path)
                        .map_err(|error| self.entry_io(&source.name, error))?;
                    self.write_entry(&source.name, &options, S_IFREG, Payload::Rewindable(&mut file))
                }
            }
        }
    }

    /// Append a new entry using the provided name, options and payload as [`Read`] object to
    /// be compressed.
    pub fn append<R: Read>(
        &mut self,
        file_name: &str,
        options: &FileOptions,
        payload: &mut R,
    ) -> Result<(), ArchiveError> {
        let name = self.check_name(file_name)?;
        self.write_entry(&name, options, S_IFREG, Payload::Stream(payload))
    }

    /// Append a directory entry to the archive.
    ///
    /// The name gets a trailing `/` when it has none.
    pub fn append_directory(
        &mut self,
        file_name: &str,
        options: &FileOptions,
    ) -> Result<(), ArchiveError> {
        let mut name = self.check_name(file_name)?;

        //ensure that the name end with a slash ('/')
        if !name.ends_with('/') {
            name.push('/');
        }

        let options = options
            .clone()
            .compression_method(CompressionMethod::Store());
        self.write_entry(&name, &options, S_IFDIR, Payload::Empty)
    }

    /// Append a symbolic link entry, its content is the link target.
    pub fn append_symlink(
        &mut self,
        file_name: &str,
        target: &str,
        options: &FileOptions,
    ) -> Result<(), ArchiveError> {
        let name = self.check_name(file_name)?;
        let options = options
            .clone()
            .compression_method(CompressionMethod::Store())
            .unix_permissions(0o777);
        let mut target = target.as_bytes();
        self.write_entry(&name, &options, S_IFLNK, Payload::Stream(&mut target))
    }

    fn entry_io(&self, name: &str, source: io::Error) -> ArchiveError {
        ArchiveError::EntryIo {
            name: name.to_owned(),
            offset: self.sink.get_written_bytes_count(),
            source,
        }
    }

    /// Write one entry. On failure the sink is moved back to where the entry
    /// started, so no part of it survives in the archive.
    fn write_entry(
        &mut self,
        name: &str,
        options: &FileOptions,
        file_type: u32,
        payload: Payload<'_>,
    ) -> Result<(), ArchiveError> {
        let compression_method = match &payload {
            Payload::Compressed(compressed) => compressed.compression_method,
            _ => options.effective_compression_method(),
        };
        if !compression_method.can_compress() {
            return Err(ArchiveError::UnsupportedMethod {
                name: name.to_owned(),
                offset: self.sink.get_written_bytes_count(),
                method: compression_method.zip_code(),
            });
        }

        let file_header_offset = self.sink.get_written_bytes_count();
        let entry = self.build_entry(
            name,
            options,
            file_type,
            compression_method,
            file_header_offset,
        );

        match self.write_entry_data(entry, options, payload) {
            Ok(entry) => {
                debug!(
                    "added {} ({} -> {} bytes, {})",
                    entry.name,
                    entry.uncompressed_size,
                    entry.compressed_size,
                    entry.compression_method
                );
                self.entries.push(entry);
                Ok(())
            }
            Err(error) => {
                warn!("rolling back entry {}: {}", name, error);
                self.sink.rewind_to(file_header_offset)?;
                Err(ArchiveError::EntryIo {
                    name: name.to_owned(),
                    offset: file_header_offset,
                    source: error,
                })
            }
        }
    }

    fn build_entry(
        &self,
        name: &str,
        options: &FileOptions,
        file_type: u32,
        compression_method: CompressionMethod,
        file_header_offset: u64,
    ) -> ArchiveFileEntry {
        let permissions = options.unix_permissions.unwrap_or(if file_type == S_IFDIR {
            DEFAULT_DIRECTORY_PERMISSIONS
        } else {
            DEFAULT_FILE_PERMISSIONS
        });
        let unix_mode = file_type | permissions;

        let mut external_file_attributes = unix_mode << 16;
        if file_type == S_IFDIR {
            external_file_attributes |= MSDOS_DIRECTORY_ATTRIBUTE;
        }

        let mut general_purpose_flags = if name.is_ascii() { 0 } else { UTF8_NAME_FLAG };
        if compression_method == CompressionMethod::Lzma() {
            general_purpose_flags |= LZMA_END_OF_STREAM_FLAG;
        }
        let (last_mod_file_date, last_mod_file_time) = options.last_modified_time.ms_dos();
        let modified_time = options.last_modified_time.timestamp();

        let mut extra_field = ArchiveDescriptor::new(32);
        ExtraFieldAsiUnix::new(unix_mode).central_header_write_data(&mut extra_field);
        ExtraFieldExtendedTimestamp::new(modified_time, None, None)
            .central_header_write_data(&mut extra_field);

        ArchiveFileEntry {
            name: name.to_owned(),
            is_directory: file_type == S_IFDIR,
            compression_method,
            unix_mode: Some(unix_mode),
            local_header_offset: file_header_offset,
            version_made_by: VERSION_MADE_BY,
            version_needed: compression_method.zip_version_needed(),
            general_purpose_flags,
            last_mod_file_time,
            last_mod_file_date,
            modified_time: modified_time.map(i64::from),
            external_file_attributes,
            comment: options.comment.clone(),
            extra_field: extra_field.finish(),
            ..Default::default()
        }
    }

    /// The local extra field, the Zip64 record first so it can be patched in place.
    fn local_extra_field(entry: &ArchiveFileEntry, reserve_zip64: bool) -> Vec<u8> {
        let mut extra_field = ArchiveDescriptor::new(64);
        if reserve_zip64 {
            ExtraFieldZIP64ExtendedInformation::for_local_header(
                entry.uncompressed_size,
                entry.compressed_size,
            )
            .local_header_write_data(&mut extra_field);
        }
        if let Some(mode) = entry.unix_mode {
            ExtraFieldAsiUnix::new(mode).local_header_write_data(&mut extra_field);
        }
        ExtraFieldExtendedTimestamp::new(entry.modified_time.map(|time| time as i32), None, None)
            .local_header_write_data(&mut extra_field);
        extra_field.finish()
    }

    fn write_entry_data(
        &mut self,
        mut entry: ArchiveFileEntry,
        options: &FileOptions,
        payload: Payload<'_>,
    ) -> io::Result<ArchiveFileEntry> {
        let file_header_offset = entry.local_header_offset;
        let reserve_zip64 = options.large_file;
        if reserve_zip64 {
            entry.version_needed = entry.version_needed.max(VERSION_NEEDED_ZIP64);
        }

        let mut file_header = ArchiveDescriptor::new(128);
        build_file_header(
            &mut file_header,
            &entry,
            &Self::local_extra_field(&entry, reserve_zip64),
            reserve_zip64,
        );
        self.sink.write_all(file_header.buffer())?;

        let file_begin = self.sink.get_written_bytes_count();
        let mut hasher = Hasher::new();

        let result = match payload {
            Payload::Empty => CompressResult {
                uncompressed_size: 0,
                is_text: false,
            },
            Payload::Stream(reader) => compress(
                entry.compression_method,
                &mut self.sink,
                reader,
                &mut hasher,
                options.compression_level,
            )?,
            Payload::Compressed(mut compressed) => {
                io::copy(&mut compressed.data, &mut self.sink)?;
                hasher = Hasher::new_with_initial(compressed.crc32);
                CompressResult {
                    uncompressed_size: compressed.uncompressed_size,
                    is_text: compressed.is_text,
                }
            }
            Payload::Rewindable(file) => {
                let result = compress(
                    entry.compression_method,
                    &mut self.sink,
                    &mut *file,
                    &mut hasher,
                    options.compression_level,
                )?;
                let compressed_size = self.sink.get_written_bytes_count() - file_begin;

                if options.store_if_larger
                    && entry.compression_method != CompressionMethod::Store()
                    && compressed_size >= result.uncompressed_size
                {
                    debug!("{} does not shrink, storing it", entry.name);
                    entry.compression_method = CompressionMethod::Store();
                    entry.general_purpose_flags &= !LZMA_END_OF_STREAM_FLAG;
                    entry.version_needed = CompressionMethod::Store().zip_version_needed();
                    if reserve_zip64 {
                        entry.version_needed = entry.version_needed.max(VERSION_NEEDED_ZIP64);
                    }
                    self.sink.rewind_to(file_begin)?;
                    file.seek(SeekFrom::Start(0))?;
                    hasher = Hasher::new();
                    compress(
                        CompressionMethod::Store(),
                        &mut self.sink,
                        &mut *file,
                        &mut hasher,
                        Level::None,
                    )?
                } else {
                    result
                }
            }
        };

        let archive_size = self.sink.get_written_bytes_count();
        entry.crc32 = hasher.finalize();
        entry.compressed_size = archive_size - file_begin;
        entry.uncompressed_size = result.uncompressed_size;
        if options.detect_file_type && result.is_text {
            entry.internal_file_attributes |= 1;
        }

        let overflow = entry.compressed_size >= u32::MAX as u64
            || entry.uncompressed_size >= u32::MAX as u64;

        if overflow && !reserve_zip64 {
            // The local header has no room for the sizes, move them to a data descriptor.
            entry.general_purpose_flags |= EXTENDED_LOCAL_HEADER_FLAG;
            entry.version_needed = entry.version_needed.max(VERSION_NEEDED_ZIP64);
            let mut streamed = entry.clone();
            streamed.crc32 = 0;
            streamed.compressed_size = 0;
            streamed.uncompressed_size = 0;

            let mut file_header = ArchiveDescriptor::new(128);
            build_file_header(
                &mut file_header,
                &streamed,
                &Self::local_extra_field(&streamed, false),
                false,
            );
            self.sink.write_at(file_header_offset, file_header.buffer())?;

            let mut data_descriptor = ArchiveDescriptor::new(24);
            data_descriptor.write_u32(DATA_DESCRIPTOR_SIGNATURE);
            data_descriptor.write_u32(entry.crc32);
            data_descriptor.write_u64(entry.compressed_size);
            data_descriptor.write_u64(entry.uncompressed_size);
            self.sink.write_all(data_descriptor.buffer())?;
        } else {
            let mut file_header = ArchiveDescriptor::new(128);
            build_file_header(
                &mut file_header,
                &entry,
                &Self::local_extra_field(&entry, reserve_zip64),
                reserve_zip64,
            );
            self.sink.write_at(file_header_offset, file_header.buffer())?;
        }

        Ok(entry)
    }

    /// Finalize the archive by writing the central directory and the end of
    /// central directory records, then flush and sync the sink.
    ///
    /// Returns the archive size (bytes) and the sink passed at creation.
    pub fn finalize(mut self) -> Result<(u64, W), ArchiveError> {
        let central_directory_offset = self.sink.get_written_bytes_count();
        let mut central_directory_header = ArchiveDescriptor::new(500);

        for entry in &self.entries {
            build_central_directory_file_header(&mut central_directory_header, entry);
            self.sink.write_all(central_directory_header.buffer())?;
            central_directory_header.clear();
        }

        let central_directory_size =
            self.sink.get_written_bytes_count() - central_directory_offset;

        let mut central_directory_end = CentralDirectoryEnd::new(
            self.entries.len() as u64,
            central_directory_offset,
            central_directory_size,
        );
        central_directory_end.archive_comment = self.central_directory_end.archive_comment.take();
        central_directory_end.zip64 = self.entries.iter().any(ArchiveFileEntry::is_zip64);

        let mut trailer = ArchiveDescriptor::new(200);
        central_directory_end.create_trailer(&mut trailer);
        self.sink.write_all(trailer.buffer())?;

        self.sink.truncate_and_sync()?;

        let archive_size = self.sink.get_written_bytes_count();
        debug!(
            "archive finalized: {} entries, {} bytes, zip64: {}",
            self.entries.len(),
            archive_size,
            central_directory_end.zip64
        );

        Ok((archive_size, self.sink.retrieve_writer()))
    }
}

#[cfg(unix)]
fn permissions_of(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn permissions_of(_metadata: &fs::Metadata) -> Option<u32> {
    None
}
