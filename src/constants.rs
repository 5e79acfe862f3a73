use std::mem::size_of;

pub const FILE_HEADER_BASE_SIZE: u64 = (7 * size_of::<u16>() + 4 * size_of::<u32>()) as u64;
pub const CENTRAL_DIRECTORY_ENTRY_BASE_SIZE: u64 =
    (11 * size_of::<u16>() + 6 * size_of::<u32>()) as u64;
pub const END_OF_CENTRAL_DIRECTORY_SIZE: u64 = (5 * size_of::<u16>() + 3 * size_of::<u32>()) as u64;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE: u64 = 56;
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE: u64 = 20;

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
pub const CENTRAL_DIRECTORY_ENTRY_SIGNATURE: u32 = 0x02014b50;
pub const CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06054b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06064b50;
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// Offset of the file name length inside the local file header.
pub const FILE_HEADER_NAME_LENGTH_OFFSET: u64 = 26;

pub const ENCRYPTED_FLAG: u16 = 1 << 0;
/// LZMA stream terminated by an end of stream marker.
pub const LZMA_END_OF_STREAM_FLAG: u16 = 1 << 1;
pub const EXTENDED_LOCAL_HEADER_FLAG: u16 = 1 << 3;
pub const UTF8_NAME_FLAG: u16 = 1 << 11;

pub const X0001_ZIP64: u16 = 0x0001;
pub const X000D_PKWARE_UNIX: u16 = 0x000d;
pub const X5455_EXTENDEDTIMESTAMP: u16 = 0x5455;
pub const X756E_ASI_UNIX: u16 = 0x756e;

/// Host system codes stored in the upper byte of "version made by".
pub const HOST_UNIX: u8 = 3;

pub const ZIP_SPECIFICATION_VERSION: u16 = 63;
pub const VERSION_MADE_BY: u16 = (HOST_UNIX as u16) << 8 | ZIP_SPECIFICATION_VERSION;
pub const VERSION_NEEDED_ZIP64: u16 = 45;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;

pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;
pub const DEFAULT_DIRECTORY_PERMISSIONS: u32 = 0o755;
pub const MSDOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Chunk size used when streaming entry data.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// LZMA SDK version written before the properties of an LZMA entry.
pub const LZMA_SDK_VERSION: [u8; 2] = [9, 20];
pub const LZMA_PROPERTIES_SIZE: u16 = 5;
/// Properties, dictionary size and uncompressed size of the `.lzma` format.
pub const LZMA_ALONE_HEADER_SIZE: usize = 13;
/// Files smaller than this are stored rather than compressed with LZMA.
pub const LZMA_MIN_FILE_SIZE: u64 = 512;
