//! A library for creating and extracting ZIP archives.
//!
//! ZIP is an archive file format that supports lossless data compression. A ZIP file may contain one
//! or more files or directories that may have been compressed. The ZIP file format permits a number
//! of compression algorithms, though DEFLATE is the most common.
//!
//! The current implementation is based on
//!
//! [PKWARE's APPNOTE.TXT v6.3.10](https://pkware.cachefly.net/webdocs/casestudies/APPNOTE.TXT)
//!
//! ## Features
//!
//! - Store, Deflate and LZMA, for reading and writing.
//! - Parallel compression and extraction on scoped threads.
//! - Zip64 archives: more than 65535 entries, entries and archives over 4 GiB.
//! - Unix permissions and symbolic links, interoperable with Info-ZIP.
//! - Entry names are checked on both sides: no absolute path or `..` segment
//!   ever reaches the archive or the filesystem.
//! - Every extracted entry is checked against its CRC32. A damaged entry fails
//!   alone and leaves no partial file behind.
//!
//! ## Examples
//!
//! ### Create an archive from a directory
//!
//!```no_run
//! use ziptree::compress::archive::ArchiveWriter;
//! use ziptree::error::ArchiveError;
//!
//! fn main() -> Result<(), ArchiveError> {
//!     let mut archive = ArchiveWriter::create("archive.zip")?;
//!     archive.add("project", "project")?;
//!     archive.finalize()?;
//!     Ok(())
//! }
//!```
//!
//! ### Append in-memory content
//!
//!```rust
//! use std::io::Cursor;
//! use ziptree::{
//!     compress::archive::ArchiveWriter, compress::FileOptions, compression::CompressionMethod,
//!     error::ArchiveError,
//! };
//!
//! fn main() -> Result<(), ArchiveError> {
//!     let options = FileOptions::default().compression_method(CompressionMethod::Deflate());
//!
//!     let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()));
//!     archive.append("file1.txt", &options, &mut b"hello\n".as_ref())?;
//!
//!     let options = options.compression_method(CompressionMethod::Store());
//!     archive.append("file2.txt", &options, &mut b"world\n".as_ref())?;
//!
//!     let (size, _cursor) = archive.finalize()?;
//!     assert!(size > 0);
//!     Ok(())
//! }
//!```
//!
//! ### Extract an archive
//!
//!```no_run
//! use ziptree::uncompress::{ArchiveReader, ExtractOptions};
//!
//! fn main() -> Result<(), ziptree::error::ArchiveError> {
//!     let mut archive = ArchiveReader::open("archive.zip")?
//!         .with_extract_options(ExtractOptions::default().overwrite(true));
//!
//!     for entry in archive.list_entries() {
//!         println!("{}", entry?.name);
//!     }
//!
//!     let report = archive.extract_all("output")?;
//!     if !report.is_success() {
//!         eprintln!("{}", report);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Disclaimer
//!
//!This implementation is inspired by :
//!- <https://github.com/scotow/zipit> and
//!- <https://github.com/zip-rs/zip>

use std::path::Path;

mod constants;

mod archive_common;
pub mod compress;
pub mod compression;
pub mod error;
pub mod extra_field;
pub mod path;
pub mod report;
pub mod types;
pub mod uncompress;

use compress::archive::ArchiveWriter;
use error::ArchiveError;
use path::source_archive_name;
use report::TaskReport;

pub use uncompress::{extract_archive, extract_archive_parallel};

/// Create `archive_path` holding every path of `sources`.
///
/// Each source is a path relative to the working directory and is stored
/// under that same relative name, so `a/x.txt` and `b/x.txt` do not collide.
/// An absolute source or one with a `..` component is refused with
/// `InvalidPath`.
///
/// A source that cannot be added is recorded in the report, keyed by its
/// position in `sources`, and the others are still written; the archive is
/// finalized in any case. Only a failure to create or finalize the archive
/// itself is returned as an error.
pub fn create_archive<P, S>(archive_path: P, sources: &[S]) -> Result<TaskReport, ArchiveError>
where
    P: AsRef<Path>,
    S: AsRef<Path>,
{
    create(Path::new(""), archive_path.as_ref(), sources, None)
}

/// Like [`create_archive`], with `sources` relative to `root` instead of the
/// working directory.
pub fn create_archive_from<R, P, S>(
    root: R,
    archive_path: P,
    sources: &[S],
) -> Result<TaskReport, ArchiveError>
where
    R: AsRef<Path>,
    P: AsRef<Path>,
    S: AsRef<Path>,
{
    create(root.as_ref(), archive_path.as_ref(), sources, None)
}

/// Like [`create_archive`], compressing files with `threads` workers.
///
/// Entries are written in the same order as [`create_archive`] writes them.
pub fn create_archive_parallel<P, S>(
    archive_path: P,
    sources: &[S],
    threads: usize,
) -> Result<TaskReport, ArchiveError>
where
    P: AsRef<Path>,
    S: AsRef<Path>,
{
    create(Path::new(""), archive_path.as_ref(), sources, Some(threads))
}

/// Like [`create_archive_parallel`], with `sources` relative to `root`.
pub fn create_archive_parallel_from<R, P, S>(
    root: R,
    archive_path: P,
    sources: &[S],
    threads: usize,
) -> Result<TaskReport, ArchiveError>
where
    R: AsRef<Path>,
    P: AsRef<Path>,
    S: AsRef<Path>,
{
    create(root.as_ref(), archive_path.as_ref(), sources, Some(threads))
}

fn create<S: AsRef<Path>>(
    root: &Path,
    archive_path: &Path,
    sources: &[S],
    threads: Option<usize>,
) -> Result<TaskReport, ArchiveError> {
    let mut archive = ArchiveWriter::create(archive_path)?;
    let mut report = TaskReport::default();

    for (index, source) in sources.iter().enumerate() {
        let source = source.as_ref();
        let display_name = source.display().to_string();

        let archive_name = match source_archive_name(source) {
            Ok(archive_name) => archive_name,
            Err(reason) => {
                report.record_failure(
                    index,
                    &display_name,
                    ArchiveError::InvalidPath {
                        name: display_name.clone(),
                        offset: archive.get_archive_size(),
                        reason,
                    },
                );
                continue;
            }
        };

        let source_path = root.join(source);
        let added = match threads {
            Some(threads) => archive.add_parallel(&source_path, &archive_name, threads),
            None => archive.add(&source_path, &archive_name),
        };
        match added {
            Ok(_) => report.record_success(index, &display_name),
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => report.record_failure(index, &display_name, error),
        }
    }

    archive.finalize()?;
    Ok(report)
}
