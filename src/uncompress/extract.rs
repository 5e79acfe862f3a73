use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crc32fast::Hasher;
use log::{debug, warn};

use super::decompressor::decompressor;
use super::{entry_io_error, ArchiveReader, ExtractOptions};
use crate::archive_common::LocalFileHeader;
use crate::compression::CompressionMethod;
use crate::constants::{
    BUFFER_SIZE, DEFAULT_DIRECTORY_PERMISSIONS, DEFAULT_FILE_PERMISSIONS,
    EXTENDED_LOCAL_HEADER_FLAG, FILE_HEADER_BASE_SIZE, HOST_UNIX, LZMA_END_OF_STREAM_FLAG,
};
use crate::error::{ArchiveError, IntegrityFailure};
use crate::path::enclosed_path;
use crate::report::TaskReport;
use crate::types::ArchiveFileEntry;

/// Link targets longer than this are refused.
const MAX_SYMLINK_TARGET_SIZE: u64 = 4096;

/// A directory whose permissions are applied once its content is written.
#[derive(Debug)]
pub(crate) struct PendingDirectory {
    index: usize,
    name: String,
    offset: u64,
    path: PathBuf,
    mode: u32,
}

fn corrupt_entry<S: Into<String>>(entry: &ArchiveFileEntry, detail: S) -> ArchiveError {
    ArchiveError::CorruptEntry {
        name: entry.name.clone(),
        offset: entry.local_header_offset,
        detail: detail.into(),
    }
}

fn integrity_error(entry: &ArchiveFileEntry, failure: IntegrityFailure) -> ArchiveError {
    ArchiveError::IntegrityError {
        name: entry.name.clone(),
        offset: entry.local_header_offset,
        failure,
    }
}

fn read_local_header<R: Read + Seek>(
    reader: &mut R,
    entry: &ArchiveFileEntry,
) -> Result<LocalFileHeader, ArchiveError> {
    reader
        .seek(SeekFrom::Start(entry.local_header_offset))
        .map_err(|e| entry_io_error(entry, e))?;

    let mut header = vec![0u8; FILE_HEADER_BASE_SIZE as usize];
    reader
        .read_exact(&mut header)
        .map_err(|e| corrupt_entry(entry, format!("local file header cannot be read: {}", e)))?;

    let variable_length = LocalFileHeader::variable_length(&header).unwrap_or(0) as usize;
    header.resize(FILE_HEADER_BASE_SIZE as usize + variable_length, 0);
    reader
        .read_exact(&mut header[FILE_HEADER_BASE_SIZE as usize..])
        .map_err(|e| corrupt_entry(entry, format!("local file header cannot be read: {}", e)))?;

    LocalFileHeader::parse(&header)
        .ok_or_else(|| corrupt_entry(entry, "local file header signature not found"))
}

/// The local header must describe the same data as the central directory.
fn check_local_header(
    entry: &ArchiveFileEntry,
    local_header: &LocalFileHeader,
) -> Result<(), ArchiveError> {
    let method = entry.compression_method.zip_code();
    if local_header.compression_method != method {
        return Err(corrupt_entry(
            entry,
            format!(
                "local header compression method {} disagrees with central directory method {}",
                local_header.compression_method, method
            ),
        ));
    }

    if entry.compression_method == CompressionMethod::Store()
        && entry.compressed_size != entry.uncompressed_size
    {
        return Err(corrupt_entry(
            entry,
            "stored entry with different compressed and uncompressed sizes",
        ));
    }

    // Values deferred to a data descriptor are zero in the local header.
    if local_header.general_purpose_flags & EXTENDED_LOCAL_HEADER_FLAG != 0
        || entry.has_data_descriptor()
    {
        return Ok(());
    }

    if local_header.crc32 != entry.crc32
        || local_header.compressed_size != entry.compressed_size
        || local_header.uncompressed_size != entry.uncompressed_size
    {
        return Err(corrupt_entry(
            entry,
            format!(
                "local header (crc {:08x}, {}/{} bytes) disagrees with central directory (crc {:08x}, {}/{} bytes)",
                local_header.crc32,
                local_header.compressed_size,
                local_header.uncompressed_size,
                entry.crc32,
                entry.compressed_size,
                entry.uncompressed_size
            ),
        ));
    }
    Ok(())
}

/// Decompress `entry` from `reader` into `writer`.
///
/// At most `uncompressed_size` bytes are produced, then the size and the
/// CRC32 are checked.
pub(crate) fn read_entry_from<R, W>(
    reader: &mut R,
    entry: &ArchiveFileEntry,
    writer: &mut W,
) -> Result<u64, ArchiveError>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    if entry.is_encrypted() {
        return Err(corrupt_entry(entry, "encrypted entries are not supported"));
    }
    if entry.compression_method.is_unknown() {
        return Err(ArchiveError::UnsupportedMethod {
            name: entry.name.clone(),
            offset: entry.local_header_offset,
            method: entry.compression_method.zip_code(),
        });
    }

    let local_header = read_local_header(reader, entry)?;
    check_local_header(entry, &local_header)?;

    let data_offset = entry.local_header_offset + local_header.size();
    reader
        .seek(SeekFrom::Start(data_offset))
        .map_err(|e| entry_io_error(entry, e))?;

    let known_size = if entry.general_purpose_flags & LZMA_END_OF_STREAM_FLAG == 0 {
        Some(entry.uncompressed_size)
    } else {
        None
    };
    let compressed = (&mut *reader).take(entry.compressed_size);
    let mut decoder = decompressor(entry.compression_method, known_size, compressed)
        .map_err(|e| integrity_error(entry, IntegrityFailure::Stream(e.to_string())))?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut hasher = Hasher::new();
    let mut total = 0u64;

    while total < entry.uncompressed_size {
        let wanted = (entry.uncompressed_size - total).min(BUFFER_SIZE as u64) as usize;
        let read = match decoder.read(&mut buffer[..wanted]) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(integrity_error(
                    entry,
                    IntegrityFailure::Stream(e.to_string()),
                ))
            }
        };
        hasher.update(&buffer[..read]);
        writer
            .write_all(&buffer[..read])
            .map_err(|e| entry_io_error(entry, e))?;
        total += read as u64;
    }

    if total != entry.uncompressed_size {
        return Err(integrity_error(
            entry,
            IntegrityFailure::Size {
                expected: entry.uncompressed_size,
                actual: total,
            },
        ));
    }

    let checksum = hasher.finalize();
    if checksum != entry.crc32 {
        return Err(integrity_error(
            entry,
            IntegrityFailure::Checksum {
                expected: entry.crc32,
                actual: checksum,
            },
        ));
    }

    debug!(
        "{}: {} bytes ({})",
        entry.name, total, entry.compression_method
    );
    Ok(total)
}

fn permissions_for(entry: &ArchiveFileEntry, options: &ExtractOptions) -> u32 {
    if options.restore_permissions {
        // setuid, setgid and sticky bits are not restored
        entry.permissions() & 0o777
    } else if entry.is_directory {
        DEFAULT_DIRECTORY_PERMISSIONS
    } else {
        DEFAULT_FILE_PERMISSIONS
    }
}

fn leaves_destination(entry: &ArchiveFileEntry) -> ArchiveError {
    ArchiveError::InvalidPath {
        name: entry.name.clone(),
        offset: entry.local_header_offset,
        reason: "path leaves the destination through a symbolic link",
    }
}

/// Create the directories from `destination` down to `path`, one component
/// at a time. A component that is a symbolic link is refused before anything
/// is created through it.
fn create_enclosed_dirs(
    destination: &Path,
    path: &Path,
    entry: &ArchiveFileEntry,
) -> Result<(), ArchiveError> {
    let relative = path
        .strip_prefix(destination)
        .map_err(|_| leaves_destination(entry))?;
    let mut current = destination.to_path_buf();

    for component in relative.components() {
        current.push(component);
        let metadata = match fs::symlink_metadata(&current) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(&current) {
                Ok(()) => continue,
                // created by another worker meanwhile
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    fs::symlink_metadata(&current).map_err(|e| entry_io_error(entry, e))?
                }
                Err(e) => return Err(entry_io_error(entry, e)),
            },
            other => other.map_err(|e| entry_io_error(entry, e))?,
        };

        if metadata.file_type().is_symlink() {
            return Err(leaves_destination(entry));
        }
        if !metadata.is_dir() {
            return Err(entry_io_error(
                entry,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is not a directory", current.display()),
                ),
            ));
        }
    }
    Ok(())
}

/// Extract one entry below `destination`.
///
/// Directory permissions go to `pending` when given, so they can be applied
/// after the directory content.
pub(crate) fn extract_entry_from<R: Read + Seek>(
    reader: &mut R,
    index: usize,
    entry: &ArchiveFileEntry,
    destination: &Path,
    options: &ExtractOptions,
    pending: Option<&mut Vec<PendingDirectory>>,
) -> Result<PathBuf, ArchiveError> {
    let backslash_is_separator = cfg!(not(unix)) || entry.host_system() != HOST_UNIX;
    let output = enclosed_path(destination, &entry.name, backslash_is_separator).map_err(
        |reason| ArchiveError::InvalidPath {
            name: entry.name.clone(),
            offset: entry.local_header_offset,
            reason,
        },
    )?;
    let mode = permissions_for(entry, options);

    if entry.is_directory {
        create_enclosed_dirs(destination, &output, entry)?;

        match pending {
            Some(pending) => pending.push(PendingDirectory {
                index,
                name: entry.name.clone(),
                offset: entry.local_header_offset,
                path: output.clone(),
                mode,
            }),
            None => set_path_mode(&output, mode).map_err(|e| entry_io_error(entry, e))?,
        }
        debug!("{}: directory", entry.name);
        return Ok(output);
    }

    let parent = output.parent().unwrap_or(destination);
    create_enclosed_dirs(destination, parent, entry)?;

    let exists = fs::symlink_metadata(&output).is_ok();
    if exists && !options.overwrite {
        return Err(entry_io_error(
            entry,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", output.display()),
            ),
        ));
    }

    if entry.is_symlink() {
        let target = symlink_target(reader, entry)?;
        if exists {
            fs::remove_file(&output).map_err(|e| entry_io_error(entry, e))?;
        }
        create_symlink(&target, &output).map_err(|e| entry_io_error(entry, e))?;
        debug!("{}: symbolic link to {}", entry.name, target);
        return Ok(output);
    }

    // Nothing appears at `output` before the content is verified.
    let mut temporary = tempfile::Builder::new()
        .prefix(".ziptree-")
        .tempfile_in(parent)
        .map_err(|e| entry_io_error(entry, e))?;
    read_entry_from(reader, entry, temporary.as_file_mut())?;

    let file = temporary.as_file();
    set_file_mode(file, mode).map_err(|e| entry_io_error(entry, e))?;
    if options.restore_modification_time {
        file.set_modified(entry.last_modified())
            .map_err(|e| entry_io_error(entry, e))?;
    }

    let persisted = if options.overwrite {
        temporary.persist(&output)
    } else {
        temporary.persist_noclobber(&output)
    };
    persisted.map_err(|e| entry_io_error(entry, e.error))?;

    Ok(output)
}

fn symlink_target<R: Read + Seek>(
    reader: &mut R,
    entry: &ArchiveFileEntry,
) -> Result<String, ArchiveError> {
    let target = match &entry.symlink_target {
        Some(target) => target.clone(),
        None => {
            if entry.uncompressed_size > MAX_SYMLINK_TARGET_SIZE {
                return Err(corrupt_entry(entry, "symbolic link target too long"));
            }
            let mut content = Vec::with_capacity(entry.uncompressed_size as usize);
            read_entry_from(reader, entry, &mut content)?;
            String::from_utf8_lossy(&content).into_owned()
        }
    };

    if target.is_empty() || target.contains('\0') {
        return Err(corrupt_entry(entry, "invalid symbolic link target"));
    }
    Ok(target)
}

#[cfg(unix)]
fn create_symlink(target: &str, output: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, output)
}

/// Without symbolic links, the target is written as the file content.
#[cfg(not(unix))]
fn create_symlink(target: &str, output: &Path) -> io::Result<()> {
    fs::write(output, target.as_bytes())
}

#[cfg(unix)]
fn set_file_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_file_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_path_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_path_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Apply directory permissions deepest first, so a read-only directory does
/// not prevent its subdirectories from being updated.
pub(crate) fn apply_directory_permissions(
    mut directories: Vec<PendingDirectory>,
    report: &mut TaskReport,
) {
    directories.sort_by_key(|directory| std::cmp::Reverse(directory.path.components().count()));

    for directory in directories {
        if let Err(e) = set_path_mode(&directory.path, directory.mode) {
            warn!(
                "cannot set permissions {:o} on {}: {}",
                directory.mode,
                directory.path.display(),
                e
            );
            report.record_failure(
                directory.index,
                &directory.name,
                ArchiveError::EntryIo {
                    name: directory.name.clone(),
                    offset: directory.offset,
                    source: e,
                },
            );
        }
    }
}

/// Extract the archive at `archive_path` below `destination` with `threads`
/// workers, each reading through its own file handle.
///
/// Directories are created first, then the other entries are spread over the
/// workers. Existing files are not overwritten.
pub fn extract_archive_parallel<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    destination: Q,
    threads: usize,
) -> Result<TaskReport, ArchiveError> {
    let archive_path = archive_path.as_ref();
    let destination = destination.as_ref();
    let options = ExtractOptions::default();

    let archive = ArchiveReader::open(archive_path)?;
    fs::create_dir_all(destination)?;
    let entries = archive.list_entries().collect::<Result<Vec<_>, _>>()?;
    let mut reader = archive.into_inner();

    let (directories, files): (Vec<_>, Vec<_>) =
        entries.iter().enumerate().partition(|(_, entry)| entry.is_directory);

    let mut report = TaskReport::default();
    let mut pending = Vec::new();
    for (index, entry) in directories {
        match extract_entry_from(
            &mut reader,
            index,
            entry,
            destination,
            &options,
            Some(&mut pending),
        ) {
            Ok(_) => report.record_success(index, &entry.name),
            Err(error) => report.record_failure(index, &entry.name, error),
        }
    }

    let threads = threads.clamp(1, files.len().max(1));
    debug!(
        "extracting {} entries with {} workers",
        files.len(),
        threads
    );

    let worker_reports: Vec<Result<TaskReport, ArchiveError>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                let share: Vec<(usize, &ArchiveFileEntry)> =
                    files.iter().skip(worker).step_by(threads).copied().collect();

                scope.spawn(move || -> Result<TaskReport, ArchiveError> {
                    let mut file = File::open(archive_path)?;
                    let mut report = TaskReport::default();
                    for (index, entry) in share {
                        match extract_entry_from(
                            &mut file,
                            index,
                            entry,
                            destination,
                            &options,
                            None,
                        ) {
                            Ok(_) => report.record_success(index, &entry.name),
                            Err(error) => report.record_failure(index, &entry.name, error),
                        }
                    }
                    Ok(report)
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| {
                worker.join().unwrap_or_else(|_| {
                    Err(ArchiveError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "extraction worker panicked",
                    )))
                })
            })
            .collect()
    });

    for worker_report in worker_reports {
        report.merge(worker_report?);
    }

    apply_directory_permissions(pending, &mut report);
    Ok(report)
}
