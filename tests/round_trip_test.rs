use std::fs::{self, File};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ziptree::{
    compress::archive::ArchiveWriter, compress::FileOptions, compression::CompressionMethod,
    create_archive, create_archive_from, create_archive_parallel_from, error::ArchiveError,
    extract_archive, extract_archive_parallel, uncompress::ArchiveReader,
};
mod common;
use common::std::{sample_tree, temp_dir, tree_listing, write_file};

fn round_trip(options: FileOptions) -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    sample_tree(&source);

    let archive_path = work.path().join("archive.zip");
    let mut archive = ArchiveWriter::create(&archive_path)?.with_options(options);
    let added = archive.add(&source, "tree")?;
    let (archive_size, _) = archive.finalize()?;

    assert_eq!(added, 9);
    assert_eq!(archive_size, fs::metadata(&archive_path)?.len());

    let destination = work.path().join("destination");
    let report = extract_archive(&archive_path, &destination)?;

    assert!(report.is_success(), "{}", report);
    assert_eq!(report.success_count(), added);
    assert_eq!(tree_listing(&source), tree_listing(&destination.join("tree")));
    Ok(())
}

#[test]
fn round_trip_deflate() -> Result<(), ArchiveError> {
    round_trip(FileOptions::default())
}

#[test]
fn round_trip_store() -> Result<(), ArchiveError> {
    round_trip(FileOptions::default().compression_method(CompressionMethod::Store()))
}

#[test]
fn entries_are_sorted_and_methods_chosen() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    sample_tree(&source);

    let archive_path = work.path().join("archive.zip");
    let mut archive = ArchiveWriter::create(&archive_path)?;
    archive.add(&source, "tree")?;
    archive.finalize()?;

    let reader = ArchiveReader::open(&archive_path)?;
    let entries = reader.list_entries().collect::<Result<Vec<_>, _>>()?;
    let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "tree/",
            "tree/data/",
            "tree/data/empty_dir/",
            "tree/data/nested/",
            "tree/data/nested/deep/",
            "tree/data/nested/deep/notes.md",
            "tree/data/noise.bin",
            "tree/empty.txt",
            "tree/readme.txt",
        ]
    );

    let method_of = |name: &str| {
        entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.compression_method)
    };
    // incompressible data is stored
    assert_eq!(method_of("tree/data/noise.bin"), Some(CompressionMethod::Store()));
    assert_eq!(method_of("tree/readme.txt"), Some(CompressionMethod::Deflate()));
    assert_eq!(method_of("tree/data/"), Some(CompressionMethod::Store()));

    let readme = entries
        .iter()
        .find(|entry| entry.name == "tree/readme.txt")
        .unwrap();
    assert!(readme.compressed_size < readme.uncompressed_size);
    Ok(())
}

#[test]
fn create_archive_refuses_existing_file() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let archive_path = write_file(work.path(), "archive.zip", b"not an archive");

    let error = ArchiveWriter::create(&archive_path).err().unwrap();
    assert!(matches!(error, ArchiveError::Io(_)));
    assert_eq!(fs::read(&archive_path)?, b"not an archive");
    Ok(())
}

#[test]
fn create_archive_reports_bad_sources() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    sample_tree(&source);

    let archive_path = work.path().join("archive.zip");
    let sources = ["readme.txt", "data", "missing.txt"];
    let report = create_archive_from(&source, &archive_path, &sources)?;

    assert!(!report.is_success());
    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failure_count(), 1);
    assert!(matches!(
        report.failure_of("missing.txt"),
        Some(ArchiveError::EntryIo { .. })
    ));

    // the archive is still complete
    let reader = ArchiveReader::open(&archive_path)?;
    let names = reader
        .list_entries()
        .map(|entry| entry.map(|entry| entry.name))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(names.first().map(String::as_str), Some("readme.txt"));
    assert!(names.contains(&"data/nested/deep/notes.md".to_owned()));
    Ok(())
}

#[test]
fn existing_files_are_kept() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    sample_tree(&source);
    let archive_path = work.path().join("archive.zip");
    create_archive_from(work.path(), &archive_path, &["source"])?;

    let destination = work.path().join("destination");
    assert!(extract_archive(&archive_path, &destination)?.is_success());

    let readme = destination.join("source/readme.txt");
    fs::write(&readme, b"edited")?;

    let report = extract_archive(&archive_path, &destination)?;
    // the four files fail, the directories are already there
    assert_eq!(report.failure_count(), 4);
    assert!(report
        .failed()
        .all(|(_, error)| matches!(error, ArchiveError::EntryIo { .. })));
    assert_eq!(fs::read(&readme)?, b"edited");
    Ok(())
}

#[test]
fn modification_time_is_restored() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    let file_path = write_file(&source, "dated.txt", b"from the past");
    let modified = UNIX_EPOCH + Duration::from_secs(1_577_836_800);
    File::options()
        .write(true)
        .open(&file_path)?
        .set_modified(modified)?;

    let archive_path = work.path().join("archive.zip");
    create_archive_from(work.path(), &archive_path, &["source"])?;

    let destination = work.path().join("destination");
    extract_archive(&archive_path, &destination)?;

    let restored: SystemTime = fs::metadata(destination.join("source/dated.txt"))?.modified()?;
    assert_eq!(restored, modified);
    Ok(())
}

#[test]
fn parallel_extraction() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    sample_tree(&source);
    for index in 0..40 {
        write_file(
            &source,
            &format!("many/file_{:02}.txt", index),
            format!("content of file {}\n", index).repeat(index + 1).as_bytes(),
        );
    }

    let archive_path = work.path().join("archive.zip");
    assert!(create_archive_from(work.path(), &archive_path, &["source"])?.is_success());

    let destination = work.path().join("destination");
    let report = extract_archive_parallel(&archive_path, &destination, 4)?;

    assert!(report.is_success(), "{}", report);
    assert_eq!(report.success_count(), 50);
    assert_eq!(tree_listing(&source), tree_listing(&destination.join("source")));
    Ok(())
}

#[test]
fn sources_keep_their_relative_path() -> Result<(), ArchiveError> {
    let work = temp_dir();
    write_file(work.path(), "a/x.txt", b"first x");
    write_file(work.path(), "b/x.txt", b"second x");

    let archive_path = work.path().join("archive.zip");
    let report = create_archive_from(work.path(), &archive_path, &["a/x.txt", "./b/x.txt"])?;
    assert!(report.is_success(), "{}", report);
    assert_eq!(report.succeeded().collect::<Vec<_>>(), ["a/x.txt", "./b/x.txt"]);

    let reader = ArchiveReader::open(&archive_path)?;
    let names = reader
        .list_entries()
        .map(|entry| entry.map(|entry| entry.name))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(names, ["a/x.txt", "b/x.txt"]);

    let destination = work.path().join("destination");
    let report = extract_archive(&archive_path, &destination)?;
    assert!(report.is_success(), "{}", report);
    assert_eq!(fs::read(destination.join("a/x.txt"))?, b"first x");
    assert_eq!(fs::read(destination.join("b/x.txt"))?, b"second x");
    Ok(())
}

#[test]
fn unsafe_sources_are_refused() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let root = work.path().join("root");
    write_file(&root, "inside.txt", b"inside");
    write_file(work.path(), "escape.txt", b"outside");

    let archive_path = work.path().join("archive.zip");
    let report = create_archive_from(
        &root,
        &archive_path,
        &["/etc/passwd", "../escape.txt", "inside.txt", "."],
    )?;

    assert!(!report.is_success());
    assert_eq!(report.succeeded().collect::<Vec<_>>(), ["inside.txt"]);
    assert_eq!(report.failure_count(), 3);
    for name in ["/etc/passwd", "../escape.txt", "."] {
        assert!(
            matches!(report.failure_of(name), Some(ArchiveError::InvalidPath { .. })),
            "{}",
            name
        );
    }

    let reader = ArchiveReader::open(&archive_path)?;
    let names = reader
        .list_entries()
        .map(|entry| entry.map(|entry| entry.name))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(names, ["inside.txt"]);
    Ok(())
}

#[test]
fn create_archive_is_relative_to_working_directory() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let archive_path = work.path().join("archive.zip");

    let report = create_archive(&archive_path, &[work.path().join("anything")])?;
    assert_eq!(report.failure_count(), 1);
    assert!(matches!(
        report.failed().next(),
        Some((_, ArchiveError::InvalidPath { reason: "absolute path", .. }))
    ));
    Ok(())
}

#[test]
fn duplicate_names_are_reported_apart() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let archive_path = work.path().join("archive.zip");
    let mut archive = ArchiveWriter::create(&archive_path)?;
    let options = FileOptions::default();
    archive.append("x.txt", &options, &mut b"first".as_ref())?;
    archive.append("x.txt", &options, &mut b"second".as_ref())?;
    archive.finalize()?;

    // the second copy fails since the first is already there
    let destination = work.path().join("destination");
    let report = extract_archive(&archive_path, &destination)?;
    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.succeeded().collect::<Vec<_>>(), ["x.txt"]);
    assert_eq!(fs::read(destination.join("x.txt"))?, b"first");
    Ok(())
}

fn many_files(source: &std::path::Path) {
    sample_tree(source);
    for index in 0..40 {
        write_file(
            source,
            &format!("many/file_{:02}.txt", index),
            format!("content of file {}\n", index).repeat(index * 10 + 1).as_bytes(),
        );
    }
}

#[test]
fn parallel_creation() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    many_files(&source);

    let sequential_path = work.path().join("sequential.zip");
    assert!(create_archive_from(work.path(), &sequential_path, &["source"])?.is_success());
    let archive_path = work.path().join("archive.zip");
    let report = create_archive_parallel_from(work.path(), &archive_path, &["source"], 4)?;
    assert!(report.is_success(), "{}", report);

    let entries_of = |path: &std::path::Path| -> Result<Vec<(String, u32)>, ArchiveError> {
        let reader = ArchiveReader::open(path)?;
        reader
            .list_entries()
            .map(|entry| entry.map(|entry| (entry.name, entry.crc32)))
            .collect()
    };
    assert_eq!(entries_of(&archive_path)?, entries_of(&sequential_path)?);

    let destination = work.path().join("destination");
    let report = extract_archive_parallel(&archive_path, &destination, 3)?;
    assert!(report.is_success(), "{}", report);
    assert_eq!(tree_listing(&source), tree_listing(&destination.join("source")));
    Ok(())
}

#[test]
fn parallel_creation_lzma() -> Result<(), ArchiveError> {
    let work = temp_dir();
    let source = work.path().join("source");
    many_files(&source);

    let archive_path = work.path().join("archive.zip");
    let mut archive = ArchiveWriter::create(&archive_path)?
        .with_options(FileOptions::default().compression_method(CompressionMethod::Lzma()));
    archive.add_parallel(&source, "source", 4)?;
    archive.finalize()?;

    let reader = ArchiveReader::open(&archive_path)?;
    let entries = reader.list_entries().collect::<Result<Vec<_>, _>>()?;
    let method_of = |name: &str| {
        entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.compression_method)
    };
    assert_eq!(method_of("source/readme.txt"), Some(CompressionMethod::Lzma()));
    // too small for LZMA
    assert_eq!(method_of("source/data/nested/deep/notes.md"), Some(CompressionMethod::Store()));
    // incompressible
    assert_eq!(method_of("source/data/noise.bin"), Some(CompressionMethod::Store()));

    let destination = work.path().join("destination");
    let report = extract_archive(&archive_path, &destination)?;
    assert!(report.is_success(), "{}", report);
    assert_eq!(tree_listing(&source), tree_listing(&destination.join("source")));
    Ok(())
}
