use std::io::Cursor;

use ziptree::{
    compress::archive::ArchiveWriter, compress::FileOptions, compression::CompressionMethod,
    error::ArchiveError, types::FileDateTime, uncompress::ArchiveReader,
};

const ENTRY_COUNT: usize = 65_537;

fn entry_name(index: usize) -> String {
    format!("entries/{:03}/{:05}.txt", index / 1000, index)
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[test]
fn more_than_65535_entries() -> Result<(), ArchiveError> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Store())
        .last_modified_time(FileDateTime::Zero);

    let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()));
    for index in 0..ENTRY_COUNT {
        let content = index.to_string();
        archive.append(&entry_name(index), &options, &mut content.as_bytes())?;
    }
    let (_, cursor) = archive.finalize()?;
    let bytes = cursor.into_inner();

    // Classic record with a saturated count, preceded by the Zip64 locator.
    let record = bytes.len() - 22;
    assert_eq!(le_u32(&bytes, record), 0x06054b50);
    assert_eq!(le_u16(&bytes, record + 8), 0xFFFF);
    assert_eq!(le_u16(&bytes, record + 10), 0xFFFF);
    assert_eq!(le_u32(&bytes, record - 20), 0x07064b50);
    assert_eq!(le_u32(&bytes, record - 20 - 56), 0x06064b50);

    let mut reader = ArchiveReader::new(Cursor::new(bytes))?;
    assert!(reader.is_zip64());
    assert_eq!(reader.len(), ENTRY_COUNT as u64);

    let entries = reader.list_entries().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(entries.len(), ENTRY_COUNT);
    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry.name, entry_name(index));
    }

    for index in [0, 65_535, ENTRY_COUNT - 1] {
        let mut content = Vec::new();
        reader.read_entry(&entries[index], &mut content)?;
        assert_eq!(content, index.to_string().as_bytes());
    }
    Ok(())
}

#[test]
fn small_archive_has_no_zip64_trailer() -> Result<(), ArchiveError> {
    let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()));
    archive.append("one.txt", &FileOptions::default(), &mut b"one".as_ref())?;
    let (_, cursor) = archive.finalize()?;
    let bytes = cursor.into_inner();

    let record = bytes.len() - 22;
    assert_eq!(le_u32(&bytes, record), 0x06054b50);
    assert_ne!(le_u32(&bytes, record - 20), 0x07064b50);

    let reader = ArchiveReader::new(Cursor::new(bytes))?;
    assert!(!reader.is_zip64());
    Ok(())
}

#[test]
fn reserved_zip64_header_reads_back() -> Result<(), ArchiveError> {
    let options = FileOptions::default().large_file(true);
    let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()));
    archive.append("big.txt", &options, &mut b"not so big after all".as_ref())?;
    let (_, cursor) = archive.finalize()?;

    let mut reader = ArchiveReader::new(Cursor::new(cursor.into_inner()))?;
    let entry = reader.list_entries().next().unwrap()?;
    assert_eq!(entry.uncompressed_size, 20);

    let mut content = Vec::new();
    reader.read_entry(&entry, &mut content)?;
    assert_eq!(content, b"not so big after all");
    Ok(())
}
