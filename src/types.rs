use core::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};

use crate::compression::CompressionMethod;
use crate::constants::{
    DEFAULT_DIRECTORY_PERMISSIONS, DEFAULT_FILE_PERMISSIONS, ENCRYPTED_FLAG,
    EXTENDED_LOCAL_HEADER_FLAG, HOST_UNIX, S_IFDIR, S_IFLNK, S_IFMT, VERSION_MADE_BY,
};
use crate::extra_field::{extra_fields, ExtraField, Zip64Fields};

/// An archive entry, as described by its central directory record.
#[derive(Debug, Clone)]
pub struct ArchiveFileEntry {
    /// Relative path, `/` separated. Directories end with a `/`.
    pub name: String,
    pub is_directory: bool,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    /// Full POSIX mode word, file type bits included.
    pub unix_mode: Option<u32>,
    pub symlink_target: Option<String>,
    pub local_header_offset: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub general_purpose_flags: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    /// Unix modification time in seconds, from the extra fields.
    pub modified_time: Option<i64>,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub disk_number: u32,
    pub comment: Option<String>,
    /// Raw extra field of the central directory record, without the Zip64 record
    /// when the entry is being written.
    pub(crate) extra_field: Vec<u8>,
}

impl Default for ArchiveFileEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_directory: false,
            uncompressed_size: 0,
            compressed_size: 0,
            compression_method: CompressionMethod::Store(),
            crc32: 0,
            unix_mode: None,
            symlink_target: None,
            local_header_offset: 0,
            version_made_by: VERSION_MADE_BY,
            version_needed: CompressionMethod::Store().zip_version_needed(),
            general_purpose_flags: 0,
            last_mod_file_time: 0,
            last_mod_file_date: 0,
            modified_time: None,
            internal_file_attributes: 0,
            external_file_attributes: 0,
            disk_number: 0,
            comment: None,
            extra_field: Vec::new(),
        }
    }
}

impl ArchiveFileEntry {
    /// Fill the values carried by the extra fields: 64-bit sizes, Unix mode,
    /// symbolic link target and modification time.
    pub(crate) fn apply_extra_fields(&mut self, zip64: Zip64Fields) {
        let mut asi_mode = None;

        for raw in extra_fields(&self.extra_field) {
            match raw.decode(zip64) {
                ExtraField::Zip64(values) => {
                    if let Some(size) = values.uncompressed_size {
                        self.uncompressed_size = size;
                    }
                    if let Some(size) = values.compressed_size {
                        self.compressed_size = size;
                    }
                    if let Some(offset) = values.offset {
                        self.local_header_offset = offset;
                    }
                    if let Some(disk_number) = values.disk_number {
                        self.disk_number = disk_number;
                    }
                }
                ExtraField::AsiUnix(unix) => {
                    asi_mode = Some(unix.mode);
                    if unix.is_symlink() && !unix.link.is_empty() {
                        self.symlink_target = Some(String::from_utf8_lossy(&unix.link).into_owned());
                    }
                }
                ExtraField::ExtendedTimestamp(timestamp) => {
                    if let Some(time) = timestamp.modify_time() {
                        self.modified_time = Some(time as i64);
                    }
                }
                ExtraField::PkwareUnix(unix) => {
                    if self.modified_time.is_none() && unix.modify_time != 0 {
                        self.modified_time = Some(unix.modify_time as i64);
                    }
                }
                ExtraField::Unknown(_) => {}
            }
        }

        self.unix_mode = asi_mode.or_else(|| self.external_unix_mode());
        if self.unix_mode.map(|mode| mode & S_IFMT) == Some(S_IFDIR) {
            self.is_directory = true;
        }
    }

    /// Mode stored in the upper half of the external attributes by Unix hosts.
    fn external_unix_mode(&self) -> Option<u32> {
        let mode = self.external_file_attributes >> 16;
        if self.host_system() == HOST_UNIX && mode != 0 {
            Some(mode)
        } else {
            None
        }
    }

    pub fn host_system(&self) -> u8 {
        (self.version_made_by >> 8) as u8
    }

    pub fn is_symlink(&self) -> bool {
        !self.is_directory && self.unix_mode.map(|mode| mode & S_IFMT) == Some(S_IFLNK)
    }

    /// Permission bits to apply on extraction, the defaults when the archive has none.
    pub fn permissions(&self) -> u32 {
        match self.unix_mode {
            Some(mode) => mode & 0o7777,
            None if self.is_directory => DEFAULT_DIRECTORY_PERMISSIONS,
            None => DEFAULT_FILE_PERMISSIONS,
        }
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.general_purpose_flags & EXTENDED_LOCAL_HEADER_FLAG != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.general_purpose_flags & ENCRYPTED_FLAG != 0
    }

    pub fn is_zip64(&self) -> bool {
        self.uncompressed_size >= u32::MAX as u64
            || self.compressed_size >= u32::MAX as u64
            || self.local_header_offset >= u32::MAX as u64
    }

    /// Modification time, from the extra fields if present, DOS fields otherwise.
    pub fn last_modified(&self) -> SystemTime {
        match self.modified_time {
            Some(seconds) if seconds >= 0 => UNIX_EPOCH + Duration::from_secs(seconds as u64),
            Some(seconds) => UNIX_EPOCH - Duration::from_secs(seconds.unsigned_abs()),
            None => {
                let seconds =
                    DateTimeCS::from_msdos(self.last_mod_file_date, self.last_mod_file_time)
                        .timestamp();
                UNIX_EPOCH + Duration::from_secs(seconds.max(0) as u64)
            }
        }
    }

    fn pretty_version(zip_version: u16) -> (u16, u16) {
        let zip_version = zip_version & 0xFF;
        (zip_version / 10, zip_version % 10)
    }
}

impl fmt::Display for ArchiveFileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let padding = 48;

        writeln!(f, "{: <padding$}{}", "file name:", self.name)?;
        writeln!(
            f,
            "{: <padding$}{}",
            "offset of local header from start of archive:", self.local_header_offset
        )?;

        let (major, minor) = ArchiveFileEntry::pretty_version(self.version_needed);
        writeln!(
            f,
            "{: <padding$}{}.{}",
            "minimum software version required to extract:", major, minor
        )?;
        writeln!(
            f,
            "{: <padding$}{:#018b}",
            "general purpose bit flag:", self.general_purpose_flags
        )?;
        writeln!(
            f,
            "{: <padding$}{}",
            "compression method:", self.compression_method
        )?;

        let date_time = DateTimeCS::from_msdos(self.last_mod_file_date, self.last_mod_file_time);
        writeln!(
            f,
            "{: <padding$}{}",
            "file last modified on (DOS date/time):", date_time
        )?;
        writeln!(f, "{: <padding$}{:x}", "32-bit CRC value (hex):", self.crc32)?;
        writeln!(
            f,
            "{: <padding$}{} bytes",
            "compressed size:", self.compressed_size
        )?;
        writeln!(
            f,
            "{: <padding$}{} bytes",
            "uncompressed size:", self.uncompressed_size
        )?;

        if let Some(mode) = self.unix_mode {
            writeln!(f, "{: <padding$}{:o}", "Unix file attributes (octal):", mode)?;
        }
        if let Some(target) = &self.symlink_target {
            writeln!(f, "{: <padding$}{}", "symbolic link to:", target)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DateTimeCS {
    year: u16,
    month: u16,
    day: u16,
    hour: u16,
    minute: u16,
    second: u16,
}

impl Default for DateTimeCS {
    /// 1980, January 1th, 12AM.
    fn default() -> Self {
        Self {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl DateTimeCS {
    pub fn new(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub fn from_chrono_datetime<Tz: TimeZone>(datetime: DateTime<Tz>) -> Self {
        Self {
            year: datetime.year() as u16,
            month: datetime.month() as u16,
            day: datetime.day() as u16,
            hour: datetime.hour() as u16,
            minute: datetime.minute() as u16,
            second: datetime.second() as u16,
        }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_chrono_datetime(DateTime::<Local>::from(time))
    }

    pub fn now() -> Self {
        Self::from_chrono_datetime(Local::now())
    }

    pub fn from_msdos(datepart: u16, timepart: u16) -> Self {
        let seconds = (timepart & 0b0000000000011111) << 1;
        let minutes = (timepart & 0b0000011111100000) >> 5;
        let hours = (timepart & 0b1111100000000000) >> 11;
        let days = datepart & 0b0000000000011111;
        let months = (datepart & 0b0000000111100000) >> 5;
        let years = (datepart & 0b1111111000000000) >> 9;

        Self {
            year: years + 1980,
            month: months,
            day: days,
            hour: hours,
            minute: minutes,
            second: seconds,
        }
    }

    pub fn to_time(&self) -> chrono::NaiveDateTime {
        let zero = DateTimeCS::default();
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
            .or_else(|| {
                NaiveDate::from_ymd_opt(zero.year as i32, zero.month as u32, zero.day as u32)
            })
            .unwrap_or_default();

        date.and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
            .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
    }

    /// The (date, time) pair of the DOS format, years before 1980 are clamped.
    pub fn ms_dos(&self) -> (u16, u16) {
        let year = self.year.clamp(1980, 1980 + 127);
        let date = self.day | (self.month << 5) | (year - 1980) << 9;
        let time = (self.second / 2) | (self.minute << 5) | self.hour << 11;
        (date, time)
    }

    /// Seconds since the Unix epoch, reading the DOS time as local time.
    pub fn timestamp(&self) -> i64 {
        match self.to_time().and_local_timezone(Local) {
            chrono::LocalResult::Single(single) => single.timestamp(),
            chrono::LocalResult::Ambiguous(first, _) => first.timestamp(),
            chrono::LocalResult::None => self.to_time().and_utc().timestamp(),
        }
    }
}

impl fmt::Display for DateTimeCS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_time())
    }
}

/// The (timezone-less) date and time that will be written in the archive alongside the file.
///
/// Use `FileDateTime::Zero` if the date and time are insignificant. This will set the value to 0 which is 1980, January 1th, 12AM.
/// Use `FileDateTime::Custom` if you need to set a custom date and time.
/// Use `FileDateTime::Now` if you want to use the current date and time.
/// Use `FileDateTime::System` to take the time of a file on disk.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum FileDateTime {
    /// 1980, January 1th, 12AM.
    #[default]
    Zero,
    /// (year, month, day, hour, minute, second)
    Custom(DateTimeCS),
    Now,
    System(SystemTime),
}

impl FileDateTime {
    fn tuple(&self) -> DateTimeCS {
        match self {
            FileDateTime::Zero => DateTimeCS::default(),
            FileDateTime::Custom(date_time) => *date_time,
            FileDateTime::Now => DateTimeCS::now(),
            FileDateTime::System(time) => DateTimeCS::from_system_time(*time),
        }
    }

    pub fn ms_dos(&self) -> (u16, u16) {
        self.tuple().ms_dos()
    }

    pub fn to_time(&self) -> chrono::NaiveDateTime {
        self.tuple().to_time()
    }

    /// Unix time for the extended timestamp field, `None` when it does not fit.
    pub fn timestamp(&self) -> Option<i32> {
        let seconds = match self {
            FileDateTime::Zero => return None,
            FileDateTime::Custom(date_time) => date_time.timestamp(),
            FileDateTime::Now => Utc::now().timestamp(),
            FileDateTime::System(time) => DateTime::<Utc>::from(*time).timestamp(),
        };
        i32::try_from(seconds).ok()
    }
}
