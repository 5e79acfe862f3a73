//! Extra field records attached to local and central directory headers.
//!
//! The extra field of a header is a sequence of `(header id, data size, data)`
//! records. [`extra_fields`] walks them lazily; [`RawExtraField::decode`] turns
//! the ones this crate understands into typed values and keeps the others as
//! [`ExtraFieldUnknown`].
//!
//! Field layouts follow Info-ZIP's `proginfo/extrafld.txt` and PKWARE's
//! APPNOTE.TXT section 4.5.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use log::warn;

use crate::archive_common::{ArchiveDescriptor, ArchiveDescriptorReader};
use crate::constants::{
    S_IFLNK, S_IFMT, X0001_ZIP64, X000D_PKWARE_UNIX, X5455_EXTENDEDTIMESTAMP, X756E_ASI_UNIX,
};
use crate::types::ArchiveFileEntry;

/// Extra fields this crate knows how to write.
pub trait ExtraFields: Debug {
    fn header_id(&self) -> u16;

    fn local_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor);

    fn central_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor);

    fn local_header_extra_field_size(&self) -> u16 {
        let mut descriptor = ArchiveDescriptor::new(64);
        self.local_header_write_data(&mut descriptor);
        descriptor.len() as u16
    }
}

/// One undecoded record of an extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExtraField<'a> {
    pub header_id: u16,
    pub data: &'a [u8],
}

/// Lazy iterator over the records of an extra field.
///
/// Iteration stops at the first record whose declared size overruns the field.
pub struct ExtraFieldIter<'a> {
    indexer: ArchiveDescriptorReader<'a>,
}

pub fn extra_fields(extra_field_as_bytes: &[u8]) -> ExtraFieldIter<'_> {
    ExtraFieldIter {
        indexer: ArchiveDescriptorReader::new(extra_field_as_bytes),
    }
}

impl<'a> Iterator for ExtraFieldIter<'a> {
    type Item = RawExtraField<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Some writers pad the extra field with a few zero bytes.
        if self.indexer.remaining() < 4 {
            return None;
        }

        let header_id = self.indexer.read_u16()?;
        let extra_field_data_size = self.indexer.read_u16()?;

        match self.indexer.read_slice(extra_field_data_size as usize) {
            Some(data) => Some(RawExtraField { header_id, data }),
            None => {
                warn!(
                    "extra field 0x{:04X} declares {} bytes, only {} left",
                    header_id,
                    extra_field_data_size,
                    self.indexer.remaining()
                );
                self.indexer.read_slice(self.indexer.remaining());
                None
            }
        }
    }
}

/// The header fields that were saturated and must be read from the Zip64 record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Fields {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub offset: bool,
    pub disk_number: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Zip64(ExtraFieldZIP64ExtendedInformation),
    AsiUnix(ExtraFieldAsiUnix),
    PkwareUnix(ExtraFieldPkwareUnix),
    ExtendedTimestamp(ExtraFieldExtendedTimestamp),
    Unknown(ExtraFieldUnknown),
}

impl<'a> RawExtraField<'a> {
    /// Decode the record. `zip64` tells which values the Zip64 record holds.
    ///
    /// Known records that fail to parse are returned as unknown ones.
    pub fn decode(&self, zip64: Zip64Fields) -> ExtraField {
        let decoded = match self.header_id {
            ExtraFieldZIP64ExtendedInformation::HEADER_ID => {
                ExtraFieldZIP64ExtendedInformation::parse_extra_field(self.data, zip64)
                    .map(ExtraField::Zip64)
            }
            ExtraFieldAsiUnix::HEADER_ID => {
                ExtraFieldAsiUnix::parse_extra_field(self.data).map(ExtraField::AsiUnix)
            }
            ExtraFieldPkwareUnix::HEADER_ID => {
                ExtraFieldPkwareUnix::parse_extra_field(self.data).map(ExtraField::PkwareUnix)
            }
            ExtraFieldExtendedTimestamp::HEADER_ID => {
                ExtraFieldExtendedTimestamp::parse_extra_field(self.data)
                    .map(ExtraField::ExtendedTimestamp)
            }
            _ => None,
        };

        decoded.unwrap_or_else(|| {
            if matches!(
                self.header_id,
                X0001_ZIP64 | X756E_ASI_UNIX | X000D_PKWARE_UNIX | X5455_EXTENDEDTIMESTAMP
            ) {
                warn!(
                    "malformed extra field 0x{:04X} ({} bytes), ignored",
                    self.header_id,
                    self.data.len()
                );
            }
            ExtraField::Unknown(ExtraFieldUnknown {
                header_id: self.header_id,
                data: self.data.to_vec(),
            })
        })
    }
}

/// The following is the layout of the ZIP64 extended
/// information "extra" block. If one of the size or
/// offset fields in the Local or Central directory
/// record is too small to hold the required data,
/// a ZIP64 extended information record is created.
/// The order of the fields in the ZIP64 extended
/// information record is fixed, but the fields will
/// only appear if the corresponding Local or Central
/// directory record field is set to 0xFFFF or 0xFFFFFFFF.
///
/// Note: all fields stored in Intel low-byte/high-byte order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldZIP64ExtendedInformation {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub offset: Option<u64>,
    pub disk_number: Option<u32>,
}

impl ExtraFieldZIP64ExtendedInformation {
    pub const HEADER_ID: u16 = X0001_ZIP64;

    /// Size of a local header record holding both sizes.
    pub const LOCAL_HEADER_SIZE: u16 = 4 + 2 * 8;

    /// The record a local header needs, both sizes always present.
    pub fn for_local_header(uncompressed_size: u64, compressed_size: u64) -> Self {
        Self {
            uncompressed_size: Some(uncompressed_size),
            compressed_size: Some(compressed_size),
            offset: None,
            disk_number: None,
        }
    }

    /// The record the central directory needs for `entry`, if any.
    pub fn for_central_header(entry: &ArchiveFileEntry) -> Option<Self> {
        let limit = u32::MAX as u64;
        let zip64 = Self {
            uncompressed_size: (entry.uncompressed_size >= limit)
                .then_some(entry.uncompressed_size),
            compressed_size: (entry.compressed_size >= limit).then_some(entry.compressed_size),
            offset: (entry.local_header_offset >= limit).then_some(entry.local_header_offset),
            disk_number: (entry.disk_number >= u16::MAX as u32).then_some(entry.disk_number),
        };

        if zip64 == Self::default() {
            None
        } else {
            Some(zip64)
        }
    }

    pub fn parse_extra_field(extra_field_as_bytes: &[u8], wanted: Zip64Fields) -> Option<Self> {
        let mut indexer = ArchiveDescriptorReader::new(extra_field_as_bytes);
        let mut zip64 = Self::default();

        // A short record leaves the trailing values unset.
        if wanted.uncompressed_size {
            zip64.uncompressed_size = indexer.read_u64();
        }
        if wanted.compressed_size {
            zip64.compressed_size = indexer.read_u64();
        }
        if wanted.offset {
            zip64.offset = indexer.read_u64();
        }
        if wanted.disk_number {
            zip64.disk_number = indexer.read_u32();
        }

        Some(zip64)
    }

    fn data_size(&self) -> u16 {
        let mut size = 0;
        size += self.uncompressed_size.map_or(0, |_| 8);
        size += self.compressed_size.map_or(0, |_| 8);
        size += self.offset.map_or(0, |_| 8);
        size += self.disk_number.map_or(0, |_| 4);
        size
    }
}

impl ExtraFields for ExtraFieldZIP64ExtendedInformation {
    fn header_id(&self) -> u16 {
        Self::HEADER_ID
    }

    fn local_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor) {
        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(16);
        archive_descriptor.write_u64(self.uncompressed_size.unwrap_or_default());
        archive_descriptor.write_u64(self.compressed_size.unwrap_or_default());
    }

    fn central_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor) {
        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(self.data_size());
        if let Some(size) = self.uncompressed_size {
            archive_descriptor.write_u64(size);
        }
        if let Some(size) = self.compressed_size {
            archive_descriptor.write_u64(size);
        }
        if let Some(offset) = self.offset {
            archive_descriptor.write_u64(offset);
        }
        if let Some(disk_number) = self.disk_number {
            archive_descriptor.write_u32(disk_number);
        }
    }
}

/// ASi Unix extra field (0x756e).
///
/// ```text
/// Value         Size        Description
/// -----         ----        -----------
/// (Unix3) 0x756e        Short       tag for this extra block type ("nu")
/// TSize         Short       total data size for this block
/// CRC           Long        CRC-32 of the remaining data
/// Mode          Short       file permissions
/// SizDev        Long        symlink'd size OR major/minor dev num
/// UID           Short       user ID
/// GID           Short       group ID
/// (var.)        variable    symbolic link filename
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldAsiUnix {
    pub mode: u32,
    pub size_dev: u32,
    pub uid: u16,
    pub gid: u16,
    pub link: Vec<u8>,
}

impl ExtraFieldAsiUnix {
    pub const HEADER_ID: u16 = X756E_ASI_UNIX;

    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn parse_extra_field(extra_field_as_bytes: &[u8]) -> Option<Self> {
        let mut indexer = ArchiveDescriptorReader::new(extra_field_as_bytes);

        let crc = indexer.read_u32()?;
        let mut hasher = Hasher::new();
        hasher.update(&extra_field_as_bytes[4..]);
        let actual = hasher.finalize();
        if crc != actual {
            warn!(
                "ASi Unix extra field CRC mismatch: expected {:08x} got {:08x}",
                crc, actual
            );
            return None;
        }

        let mode = indexer.read_u16()? as u32;
        let size_dev = indexer.read_u32()?;
        let uid = indexer.read_u16()?;
        let gid = indexer.read_u16()?;
        let link = indexer.read_bytes(indexer.remaining())?;

        Some(Self {
            mode,
            size_dev,
            uid,
            gid,
            link,
        })
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = ArchiveDescriptor::new(12 + self.link.len() as u64);
        payload.write_u16(self.mode as u16);
        payload.write_u32(self.size_dev);
        payload.write_u16(self.uid);
        payload.write_u16(self.gid);
        payload.write_bytes(&self.link);
        payload.finish()
    }
}

impl ExtraFields for ExtraFieldAsiUnix {
    fn header_id(&self) -> u16 {
        Self::HEADER_ID
    }

    fn local_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor) {
        let payload = self.payload();
        let mut hasher = Hasher::new();
        hasher.update(&payload);

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(4 + payload.len() as u16);
        archive_descriptor.write_u32(hasher.finalize());
        archive_descriptor.write_bytes(&payload);
    }

    fn central_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor) {
        self.local_header_write_data(archive_descriptor)
    }
}

/// PKWARE Unix extra field (0x000d).
///
/// Holds access and modification times, owner and a variable tail: the link
/// target for symbolic links, the device numbers for device nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldPkwareUnix {
    pub access_time: u32,
    pub modify_time: u32,
    pub uid: u16,
    pub gid: u16,
    pub data: Vec<u8>,
}

impl ExtraFieldPkwareUnix {
    pub const HEADER_ID: u16 = X000D_PKWARE_UNIX;

    pub fn parse_extra_field(extra_field_as_bytes: &[u8]) -> Option<Self> {
        let mut indexer = ArchiveDescriptorReader::new(extra_field_as_bytes);
        Some(Self {
            access_time: indexer.read_u32()?,
            modify_time: indexer.read_u32()?,
            uid: indexer.read_u16()?,
            gid: indexer.read_u16()?,
            data: indexer.read_bytes(indexer.remaining())?,
        })
    }
}

/// Info-ZIP extended timestamp (0x5455).
///
/// The time values are in standard Unix signed-long format, indicating
/// the number of seconds since 1 January 1970 00:00:00.  The times
/// are relative to Coordinated Universal Time (UTC).
///
/// The central directory copy only ever holds the modification time, the
/// flags still tell which times the local copy has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldExtendedTimestamp {
    flags: u8,
    modify_time: Option<i32>,
    access_time: Option<i32>,
    create_time: Option<i32>,
}

impl ExtraFieldExtendedTimestamp {
    pub const HEADER_ID: u16 = X5455_EXTENDEDTIMESTAMP;

    /// The bit set inside the flags by when the last modification time is present in this extra field.
    pub const MODIFY_TIME_BIT: u8 = 1;

    ///  The bit set inside the flags by when the last access time is present in this extra field.
    pub const ACCESS_TIME_BIT: u8 = 2;

    /// The bit set inside the flags by when the original creation time is present in this extra field.
    pub const CREATE_TIME_BIT: u8 = 4;

    pub fn new(
        modify_time: Option<i32>,
        access_time: Option<i32>,
        create_time: Option<i32>,
    ) -> Self {
        let mut flags = 0;
        if modify_time.is_some() {
            flags |= Self::MODIFY_TIME_BIT;
        }
        if access_time.is_some() {
            flags |= Self::ACCESS_TIME_BIT;
        }
        if create_time.is_some() {
            flags |= Self::CREATE_TIME_BIT;
        }

        Self {
            flags,
            modify_time,
            access_time,
            create_time,
        }
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn modify_time(&self) -> Option<i32> {
        self.modify_time
    }

    pub fn access_time(&self) -> Option<i32> {
        self.access_time
    }

    pub fn modified_time_utc(&self) -> Option<DateTime<Utc>> {
        self.modify_time
            .and_then(|time| DateTime::<Utc>::from_timestamp(time as i64, 0))
    }

    pub fn parse_extra_field(extra_field_as_bytes: &[u8]) -> Option<Self> {
        let mut indexer = ArchiveDescriptorReader::new(extra_field_as_bytes);
        let flags = indexer.read_u8()?;

        // Times listed in the flags may be absent, as in central headers.
        let mut read_time = |bit: u8| {
            if flags & bit != 0 {
                indexer.read_i32()
            } else {
                None
            }
        };
        let modify_time = read_time(Self::MODIFY_TIME_BIT);
        let access_time = read_time(Self::ACCESS_TIME_BIT);
        let create_time = read_time(Self::CREATE_TIME_BIT);

        Some(Self {
            flags,
            modify_time,
            access_time,
            create_time,
        })
    }

    fn local_header_extra_field_data_size(&self) -> u16 {
        1 + 4 * [self.modify_time, self.access_time, self.create_time]
            .iter()
            .filter(|time| time.is_some())
            .count() as u16
    }

    fn central_header_extra_field_data_size(&self) -> u16 {
        1 + self.modify_time.map_or(0, |_| 4)
    }
}

impl ExtraFields for ExtraFieldExtendedTimestamp {
    fn header_id(&self) -> u16 {
        Self::HEADER_ID
    }

    fn local_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor) {
        if self.flags == 0 {
            return;
        }

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(self.local_header_extra_field_data_size());
        archive_descriptor.write_u8(self.flags);
        for time in [self.modify_time, self.access_time, self.create_time]
            .into_iter()
            .flatten()
        {
            archive_descriptor.write_i32(time);
        }
    }

    fn central_header_write_data(&self, archive_descriptor: &mut ArchiveDescriptor) {
        if self.flags == 0 {
            return;
        }

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(self.central_header_extra_field_data_size());
        archive_descriptor.write_u8(self.flags);
        if let Some(modify_time) = self.modify_time {
            archive_descriptor.write_i32(modify_time);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraFieldUnknown {
    pub header_id: u16,
    pub data: Vec<u8>,
}

#[cfg(test)]
#[path = "./tests/external_fields.rs"]
mod external_fields_tests;
