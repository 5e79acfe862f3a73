use std::fmt::Debug;

use log::debug;

use crate::compression::CompressionMethod;
use crate::constants::{
    CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_ENTRY_BASE_SIZE,
    CENTRAL_DIRECTORY_ENTRY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIZE, FILE_HEADER_BASE_SIZE,
    FILE_HEADER_NAME_LENGTH_OFFSET,
    LOCAL_FILE_HEADER_SIGNATURE, UTF8_NAME_FLAG, VERSION_NEEDED_ZIP64,
    ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE, ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE,
    ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE,
};
use crate::extra_field::{
    extra_fields, ExtraField, ExtraFieldZIP64ExtendedInformation, ExtraFields, Zip64Fields,
};
use crate::types::ArchiveFileEntry;

/// Little endian byte buffer used to assemble the archive records.
#[derive(Debug)]
pub struct ArchiveDescriptor {
    buffer: Vec<u8>,
}

impl ArchiveDescriptor {
    pub fn new(capacity: u64) -> ArchiveDescriptor {
        ArchiveDescriptor {
            buffer: Vec::with_capacity(capacity as usize),
        }
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buffer.push(val);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i32(&mut self, val: i32) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_bytes(&mut self, val: &[u8]) {
        self.buffer.extend_from_slice(val);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Bounds checked little endian cursor over a record buffer.
///
/// Every read returns `None` once the buffer is exhausted, so malformed
/// lengths never index out of range.
pub struct ArchiveDescriptorReader<'a> {
    stream: &'a [u8],
    index: usize,
}

macro_rules! read_type {
    ($self:expr, $typ:ty) => {{
        const SIZE: usize = ::std::mem::size_of::<$typ>();
        let bytes = $self.read_slice(SIZE)?;
        let mut read = [0u8; SIZE];
        read.copy_from_slice(bytes);
        Some(<$typ>::from_le_bytes(read))
    }};
}

impl<'a> ArchiveDescriptorReader<'a> {
    pub fn new(stream: &'a [u8]) -> ArchiveDescriptorReader<'a> {
        ArchiveDescriptorReader { stream, index: 0 }
    }

    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.stream.len() - self.index
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        read_type!(self, u8)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        read_type!(self, u16)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        read_type!(self, u32)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        read_type!(self, i32)
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        read_type!(self, u64)
    }

    pub fn read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        let upper_bound = self.index.checked_add(len)?;
        let value = self.stream.get(self.index..upper_bound)?;
        self.index = upper_bound;
        Some(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<Vec<u8>> {
        self.read_slice(len).map(|slice| slice.to_vec())
    }
}

/// Decode an entry name or comment, UTF-8 when flagged or valid, lossy otherwise.
pub fn decode_text(bytes: &[u8], general_purpose_flags: u16) -> String {
    if general_purpose_flags & UTF8_NAME_FLAG != 0 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[derive(Debug, Default, Clone)]
pub struct CentralDirectoryEnd {
    pub number_of_this_disk: u32,
    pub number_of_the_disk_with_central_directory: u32,
    pub total_number_of_entries_on_this_disk: u64,
    pub total_number_of_entries_in_the_central_directory: u64,
    pub central_directory_size: u64,
    pub offset_of_start_of_central_directory: u64,
    pub z64ecdl_number_of_the_disk_with_the_start_of_the_zip64_end_of_central_directory: u32,
    pub z64ecdl_relative_offset_of_the_zip64_end_of_central_directory_record: u64,
    pub z64ecdl_total_number_of_disks: u32,
    pub archive_comment: Option<Vec<u8>>,
    /// Set when the values were read from (or will be written as) a Zip64 record.
    pub zip64: bool,
}

impl CentralDirectoryEnd {
    pub fn new(
        number_of_entries: u64,
        central_directory_offset: u64,
        central_directory_size: u64,
    ) -> Self {
        Self {
            total_number_of_entries_on_this_disk: number_of_entries,
            total_number_of_entries_in_the_central_directory: number_of_entries,
            central_directory_size,
            offset_of_start_of_central_directory: central_directory_offset,
            z64ecdl_total_number_of_disks: 1,
            ..Default::default()
        }
    }

    pub fn zip_file_comment_length(&self) -> u16 {
        match &self.archive_comment {
            Some(comment) => comment.len() as u16,
            None => 0,
        }
    }

    /// Set ZIP archive comment.
    ///
    /// This sets the raw bytes of the comment. The comment
    /// is typically expected to be encoded in UTF-8. Comment is truncated to 0xFFFF bytes.
    pub fn set_archive_comment(&mut self, comment: &str) {
        let bytes = comment.as_bytes();
        let len = std::cmp::min(bytes.len(), u16::MAX as usize);
        self.archive_comment = Some(bytes[0..len].to_owned());
    }

    /// A field of the classic record reads as saturated, the real value lives
    /// in the Zip64 record.
    pub fn needs_zip64_format_extensions(&self) -> bool {
        self.number_of_this_disk >= u16::MAX as u32
            || self.number_of_the_disk_with_central_directory >= u16::MAX as u32
            || self.total_number_of_entries_on_this_disk >= u16::MAX as u64
            || self.total_number_of_entries_in_the_central_directory >= u16::MAX as u64
            || self.central_directory_size >= u32::MAX as u64
            || self.offset_of_start_of_central_directory >= u32::MAX as u64
    }

    pub fn create_zip64_end_of_central_directory_record(
        &self,
        end_of_central_directory: &mut ArchiveDescriptor,
    ) {
        const SIZE_OF_THE_EOCD64_MINUS_12: u64 = ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE - 12;

        end_of_central_directory.write_u32(ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE);
        end_of_central_directory.write_u64(SIZE_OF_THE_EOCD64_MINUS_12);
        end_of_central_directory.write_u16(crate::constants::VERSION_MADE_BY);
        end_of_central_directory.write_u16(VERSION_NEEDED_ZIP64);
        end_of_central_directory.write_u32(self.number_of_this_disk);
        end_of_central_directory.write_u32(self.number_of_the_disk_with_central_directory);
        end_of_central_directory.write_u64(self.total_number_of_entries_on_this_disk);
        end_of_central_directory.write_u64(self.total_number_of_entries_in_the_central_directory);
        end_of_central_directory.write_u64(self.central_directory_size);
        end_of_central_directory.write_u64(self.offset_of_start_of_central_directory);
    }

    pub fn create_end_of_central_directory_locator(
        &mut self,
        end_of_central_directory: &mut ArchiveDescriptor,
    ) {
        self.z64ecdl_relative_offset_of_the_zip64_end_of_central_directory_record =
            self.offset_of_start_of_central_directory + self.central_directory_size;

        end_of_central_directory.write_u32(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE);
        end_of_central_directory.write_u32(
            self.z64ecdl_number_of_the_disk_with_the_start_of_the_zip64_end_of_central_directory,
        );
        end_of_central_directory
            .write_u64(self.z64ecdl_relative_offset_of_the_zip64_end_of_central_directory_record);
        end_of_central_directory.write_u32(self.z64ecdl_total_number_of_disks);
    }

    pub fn create_end_of_central_directory(
        &self,
        end_of_central_directory: &mut ArchiveDescriptor,
    ) {
        end_of_central_directory.write_u32(CENTRAL_DIRECTORY_END_SIGNATURE);
        end_of_central_directory.write_u16(self.number_of_this_disk.min(u16::MAX as u32) as u16);
        end_of_central_directory.write_u16(
            self.number_of_the_disk_with_central_directory
                .min(u16::MAX as u32) as u16,
        );
        end_of_central_directory.write_u16(
            self.total_number_of_entries_on_this_disk
                .min(u16::MAX as u64) as u16,
        );
        end_of_central_directory.write_u16(
            self.total_number_of_entries_in_the_central_directory
                .min(u16::MAX as u64) as u16,
        );

        end_of_central_directory.write_u32(self.central_directory_size.min(u32::MAX as u64) as u32);
        end_of_central_directory.write_u32(
            self.offset_of_start_of_central_directory
                .min(u32::MAX as u64) as u32,
        );

        if let Some(comment) = &self.archive_comment {
            end_of_central_directory.write_u16(comment.len() as u16);
            end_of_central_directory.write_bytes(comment);
        } else {
            end_of_central_directory.write_u16(0);
        };
    }

    /// Write the whole trailer: the Zip64 record and locator when needed, then
    /// the classic record. `self` must already hold the central directory
    /// offset and size.
    pub fn create_trailer(&mut self, trailer: &mut ArchiveDescriptor) {
        if self.zip64 || self.needs_zip64_format_extensions() {
            self.zip64 = true;
            self.create_zip64_end_of_central_directory_record(trailer);
            self.create_end_of_central_directory_locator(trailer);
        }
        self.create_end_of_central_directory(trailer);
    }

    /// Parse the classic record. `stream` starts at the signature and extends
    /// to the end of the file.
    pub fn parse_end_of_central_directory(stream: &[u8]) -> Option<Self> {
        let mut indexer = ArchiveDescriptorReader::new(stream);

        if indexer.read_u32()? != CENTRAL_DIRECTORY_END_SIGNATURE {
            return None;
        }
        let number_of_this_disk = indexer.read_u16()? as u32;
        let number_of_the_disk_with_central_directory = indexer.read_u16()? as u32;
        let total_number_of_entries_on_this_disk = indexer.read_u16()? as u64;
        let total_number_of_entries_in_the_central_directory = indexer.read_u16()? as u64;
        let central_directory_size = indexer.read_u32()? as u64;
        let offset_of_start_of_central_directory = indexer.read_u32()? as u64;
        let zip_file_comment_length = indexer.read_u16()?;
        let archive_comment = indexer.read_bytes(zip_file_comment_length as usize)?;

        Some(Self {
            number_of_this_disk,
            number_of_the_disk_with_central_directory,
            total_number_of_entries_on_this_disk,
            total_number_of_entries_in_the_central_directory,
            central_directory_size,
            offset_of_start_of_central_directory,
            archive_comment: if archive_comment.is_empty() {
                None
            } else {
                Some(archive_comment)
            },
            z64ecdl_total_number_of_disks: 1,
            ..Default::default()
        })
    }

    /// Parse the Zip64 locator, returning the offset of the Zip64 record.
    pub fn parse_zip64_end_of_central_directory_locator(stream: &[u8]) -> Option<(u32, u64, u32)> {
        let mut indexer = ArchiveDescriptorReader::new(stream);

        if indexer.read_u32()? != ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE {
            return None;
        }
        let disk = indexer.read_u32()?;
        let offset = indexer.read_u64()?;
        let total_disks = indexer.read_u32()?;
        Some((disk, offset, total_disks))
    }

    /// Overwrite the saturated values with those of the Zip64 record.
    pub fn merge_zip64_end_of_central_directory_record(&mut self, stream: &[u8]) -> Option<()> {
        let mut indexer = ArchiveDescriptorReader::new(stream);

        if indexer.read_u32()? != ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE {
            return None;
        }
        let _record_size = indexer.read_u64()?;
        let _version_made_by = indexer.read_u16()?;
        let _version_needed = indexer.read_u16()?;
        self.number_of_this_disk = indexer.read_u32()?;
        self.number_of_the_disk_with_central_directory = indexer.read_u32()?;
        self.total_number_of_entries_on_this_disk = indexer.read_u64()?;
        self.total_number_of_entries_in_the_central_directory = indexer.read_u64()?;
        self.central_directory_size = indexer.read_u64()?;
        self.offset_of_start_of_central_directory = indexer.read_u64()?;
        self.zip64 = true;

        debug!(
            "zip64 trailer: {} entries, central directory at {} ({} bytes)",
            self.total_number_of_entries_in_the_central_directory,
            self.offset_of_start_of_central_directory,
            self.central_directory_size
        );
        Some(())
    }

    pub const LOCATOR_SIZE: u64 = ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE;
    pub const RECORD_SIZE: u64 = ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE;
    pub const BASE_SIZE: u64 = END_OF_CENTRAL_DIRECTORY_SIZE;
}

/// The local file header as found in front of the entry data.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub general_purpose_flags: u16,
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name_as_bytes: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    /// Length of the variable part following the fixed header.
    ///
    /// `fixed` must hold the `FILE_HEADER_BASE_SIZE` first bytes.
    pub fn variable_length(fixed: &[u8]) -> Option<u64> {
        let mut indexer = ArchiveDescriptorReader::new(fixed);
        indexer.read_slice(FILE_HEADER_NAME_LENGTH_OFFSET as usize)?;
        let file_name_len = indexer.read_u16()? as u64;
        let extra_field_length = indexer.read_u16()? as u64;
        Some(file_name_len + extra_field_length)
    }

    /// Parse a complete local header, `None` if it is truncated or the
    /// signature is wrong.
    pub fn parse(stream: &[u8]) -> Option<Self> {
        let mut indexer = ArchiveDescriptorReader::new(stream);

        if indexer.read_u32()? != LOCAL_FILE_HEADER_SIGNATURE {
            return None;
        }
        let version_needed = indexer.read_u16()?;
        let general_purpose_flags = indexer.read_u16()?;
        let compression_method = indexer.read_u16()?;
        let last_mod_file_time = indexer.read_u16()?;
        let last_mod_file_date = indexer.read_u16()?;
        let crc32 = indexer.read_u32()?;
        let compressed_size = indexer.read_u32()?;
        let uncompressed_size = indexer.read_u32()?;
        let file_name_len = indexer.read_u16()?;
        let extra_field_length = indexer.read_u16()?;
        let file_name_as_bytes = indexer.read_bytes(file_name_len as usize)?;
        let extra_field = indexer.read_bytes(extra_field_length as usize)?;

        let mut header = Self {
            version_needed,
            general_purpose_flags,
            compression_method,
            last_mod_file_time,
            last_mod_file_date,
            crc32,
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
            file_name_as_bytes,
            extra_field,
        };

        // Local Zip64 extra fields carry both sizes whenever one is saturated.
        if compressed_size == u32::MAX || uncompressed_size == u32::MAX {
            let wanted = Zip64Fields {
                uncompressed_size: true,
                compressed_size: true,
                offset: false,
                disk_number: false,
            };
            for raw in extra_fields(&header.extra_field) {
                if let ExtraField::Zip64(zip64) = raw.decode(wanted) {
                    if let Some(size) = zip64.uncompressed_size {
                        header.uncompressed_size = size;
                    }
                    if let Some(size) = zip64.compressed_size {
                        header.compressed_size = size;
                    }
                }
            }
        }

        Some(header)
    }

    pub fn size(&self) -> u64 {
        FILE_HEADER_BASE_SIZE
            + self.file_name_as_bytes.len() as u64
            + self.extra_field.len() as u64
    }
}

/// Write a local file header for `entry`, followed by `extra_field`.
///
/// With `zip64` set, or when they do not fit, the sizes are written saturated
/// and `extra_field` is expected to hold the Zip64 record.
pub fn build_file_header(
    archive_descriptor: &mut ArchiveDescriptor,
    entry: &ArchiveFileEntry,
    extra_field: &[u8],
    zip64: bool,
) {
    let name = entry.name.as_bytes();
    let saturate = |size: u64| {
        if zip64 {
            u32::MAX
        } else {
            size.min(u32::MAX as u64) as u32
        }
    };

    archive_descriptor.write_u32(LOCAL_FILE_HEADER_SIGNATURE);
    archive_descriptor.write_u16(entry.version_needed);
    archive_descriptor.write_u16(entry.general_purpose_flags);
    archive_descriptor.write_u16(entry.compression_method.zip_code());
    archive_descriptor.write_u16(entry.last_mod_file_time);
    archive_descriptor.write_u16(entry.last_mod_file_date);
    archive_descriptor.write_u32(entry.crc32);
    archive_descriptor.write_u32(saturate(entry.compressed_size));
    archive_descriptor.write_u32(saturate(entry.uncompressed_size));
    archive_descriptor.write_u16(name.len() as u16);
    archive_descriptor.write_u16(extra_field.len() as u16);
    archive_descriptor.write_bytes(name);
    archive_descriptor.write_bytes(extra_field);
}

/// Write the central directory record of `entry`, adding the Zip64 extra
/// field for every value that overflows its 32-bit slot.
pub fn build_central_directory_file_header(
    archive_descriptor: &mut ArchiveDescriptor,
    entry: &ArchiveFileEntry,
) {
    let zip64 = ExtraFieldZIP64ExtendedInformation::for_central_header(entry);

    let mut extra = ArchiveDescriptor::new(64);
    if let Some(zip64) = &zip64 {
        zip64.central_header_write_data(&mut extra);
    }
    extra.write_bytes(&entry.extra_field);

    let version_needed = if zip64.is_some() {
        entry.version_needed.max(VERSION_NEEDED_ZIP64)
    } else {
        entry.version_needed
    };

    let name = entry.name.as_bytes();
    let comment = entry.comment.as_deref().unwrap_or_default().as_bytes();

    archive_descriptor.write_u32(CENTRAL_DIRECTORY_ENTRY_SIGNATURE);
    archive_descriptor.write_u16(entry.version_made_by);
    archive_descriptor.write_u16(version_needed);
    archive_descriptor.write_u16(entry.general_purpose_flags);
    archive_descriptor.write_u16(entry.compression_method.zip_code());
    archive_descriptor.write_u16(entry.last_mod_file_time);
    archive_descriptor.write_u16(entry.last_mod_file_date);
    archive_descriptor.write_u32(entry.crc32);
    archive_descriptor.write_u32(entry.compressed_size.min(u32::MAX as u64) as u32);
    archive_descriptor.write_u32(entry.uncompressed_size.min(u32::MAX as u64) as u32);
    archive_descriptor.write_u16(name.len() as u16);
    archive_descriptor.write_u16(extra.len() as u16);
    archive_descriptor.write_u16(comment.len().min(u16::MAX as usize) as u16);
    archive_descriptor.write_u16(entry.disk_number.min(u16::MAX as u32) as u16);
    archive_descriptor.write_u16(entry.internal_file_attributes);
    archive_descriptor.write_u32(entry.external_file_attributes);
    archive_descriptor.write_u32(entry.local_header_offset.min(u32::MAX as u64) as u32);
    archive_descriptor.write_bytes(name);
    archive_descriptor.write_bytes(extra.buffer());
    archive_descriptor.write_bytes(&comment[..comment.len().min(u16::MAX as usize)]);
}

/// Parse one central directory record at the reader position.
///
/// Returns `None` when the record is truncated or its signature is wrong.
pub fn parse_central_directory_file_header(
    indexer: &mut ArchiveDescriptorReader,
) -> Option<ArchiveFileEntry> {
    if indexer.remaining() < CENTRAL_DIRECTORY_ENTRY_BASE_SIZE as usize {
        return None;
    }
    if indexer.read_u32()? != CENTRAL_DIRECTORY_ENTRY_SIGNATURE {
        return None;
    }

    let version_made_by = indexer.read_u16()?;
    let version_needed = indexer.read_u16()?;
    let general_purpose_flags = indexer.read_u16()?;
    let compression_method = indexer.read_u16()?;
    let last_mod_file_time = indexer.read_u16()?;
    let last_mod_file_date = indexer.read_u16()?;
    let crc32 = indexer.read_u32()?;
    let compressed_size = indexer.read_u32()?;
    let uncompressed_size = indexer.read_u32()?;
    let file_name_len = indexer.read_u16()?;
    let extra_field_length = indexer.read_u16()?;
    let file_comment_length = indexer.read_u16()?;
    let disk_number = indexer.read_u16()?;
    let internal_file_attributes = indexer.read_u16()?;
    let external_file_attributes = indexer.read_u32()?;
    let local_header_offset = indexer.read_u32()?;
    let file_name_as_bytes = indexer.read_slice(file_name_len as usize)?;
    let extra_field = indexer.read_bytes(extra_field_length as usize)?;
    let file_comment_as_bytes = indexer.read_slice(file_comment_length as usize)?;

    let name = decode_text(file_name_as_bytes, general_purpose_flags);
    let comment = if file_comment_as_bytes.is_empty() {
        None
    } else {
        Some(decode_text(file_comment_as_bytes, general_purpose_flags))
    };

    let mut entry = ArchiveFileEntry {
        is_directory: name.ends_with('/'),
        name,
        uncompressed_size: uncompressed_size as u64,
        compressed_size: compressed_size as u64,
        compression_method: CompressionMethod::from_compression_method(compression_method),
        crc32,
        local_header_offset: local_header_offset as u64,
        version_made_by,
        version_needed,
        general_purpose_flags,
        last_mod_file_time,
        last_mod_file_date,
        internal_file_attributes,
        external_file_attributes,
        disk_number: disk_number as u32,
        comment,
        extra_field,
        ..Default::default()
    };

    entry.apply_extra_fields(Zip64Fields {
        uncompressed_size: uncompressed_size == u32::MAX,
        compressed_size: compressed_size == u32::MAX,
        offset: local_header_offset == u32::MAX,
        disk_number: disk_number == u16::MAX,
    });

    Some(entry)
}
