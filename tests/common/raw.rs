#![allow(dead_code)]

//! Archives assembled byte by byte, the way other encoders lay them out.

use byteorder::{LittleEndian, WriteBytesExt};

pub const HOST_UNIX: u16 = 3 << 8;
pub const HOST_MSDOS: u16 = 0;

#[derive(Debug, Clone)]
pub struct RawEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub version_made_by: u16,
    pub external_attributes: u32,
    pub crc32: u32,
    pub uncompressed_size: u32,
    /// Bytes stored after the local header, already compressed.
    pub data: Vec<u8>,
    pub central_extra: Vec<u8>,
}

impl RawEntry {
    /// A stored entry made on a DOS host, no extra field.
    pub fn stored(name: &str, content: &[u8]) -> Self {
        Self {
            name: name.to_owned(),
            method: 0,
            flags: 0,
            version_made_by: HOST_MSDOS | 20,
            external_attributes: 0,
            crc32: crc32fast::hash(content),
            uncompressed_size: content.len() as u32,
            data: content.to_vec(),
            central_extra: Vec::new(),
        }
    }

    pub fn unix_mode(mut self, mode: u32) -> Self {
        self.version_made_by = HOST_UNIX | 30;
        self.external_attributes = mode << 16;
        self
    }
}

/// An ASi Unix extra field (0x756e) carrying `mode`.
pub fn asi_unix_extra(mode: u16, link: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.write_u16::<LittleEndian>(mode).unwrap();
    payload.write_u32::<LittleEndian>(0).unwrap();
    payload.write_u16::<LittleEndian>(1000).unwrap();
    payload.write_u16::<LittleEndian>(1000).unwrap();
    payload.extend_from_slice(link);

    let mut field = Vec::new();
    field.write_u16::<LittleEndian>(0x756e).unwrap();
    field.write_u16::<LittleEndian>(payload.len() as u16 + 4).unwrap();
    field.write_u32::<LittleEndian>(crc32fast::hash(&payload)).unwrap();
    field.extend_from_slice(&payload);
    field
}

/// Lay out local headers, data, central directory and trailer.
pub fn build_archive(entries: &[RawEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();

    for entry in entries {
        offsets.push(out.len() as u32);
        out.write_u32::<LittleEndian>(0x04034b50).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(entry.flags).unwrap();
        out.write_u16::<LittleEndian>(entry.method).unwrap();
        out.write_u16::<LittleEndian>(0x6000).unwrap(); // 12:00
        out.write_u16::<LittleEndian>(0x5621).unwrap(); // 2023-01-01
        out.write_u32::<LittleEndian>(entry.crc32).unwrap();
        out.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(entry.uncompressed_size).unwrap();
        out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.data);
    }

    let central_directory_offset = out.len() as u32;
    for (entry, offset) in entries.iter().zip(offsets) {
        out.write_u32::<LittleEndian>(0x02014b50).unwrap();
        out.write_u16::<LittleEndian>(entry.version_made_by).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(entry.flags).unwrap();
        out.write_u16::<LittleEndian>(entry.method).unwrap();
        out.write_u16::<LittleEndian>(0x6000).unwrap();
        out.write_u16::<LittleEndian>(0x5621).unwrap();
        out.write_u32::<LittleEndian>(entry.crc32).unwrap();
        out.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(entry.uncompressed_size).unwrap();
        out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(entry.central_extra.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // comment
        out.write_u16::<LittleEndian>(0).unwrap(); // disk
        out.write_u16::<LittleEndian>(0).unwrap(); // internal attributes
        out.write_u32::<LittleEndian>(entry.external_attributes).unwrap();
        out.write_u32::<LittleEndian>(offset).unwrap();
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.central_extra);
    }
    let central_directory_size = out.len() as u32 - central_directory_offset;

    out.write_u32::<LittleEndian>(0x06054b50).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(entries.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(entries.len() as u16).unwrap();
    out.write_u32::<LittleEndian>(central_directory_size).unwrap();
    out.write_u32::<LittleEndian>(central_directory_offset).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out
}
