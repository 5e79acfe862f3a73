use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use log::debug;
use xz2::read::XzDecoder;
use xz2::stream::Stream;

use crate::compression::CompressionMethod;
use crate::constants::LZMA_ALONE_HEADER_SIZE;

/// Properties found at the start of an LZMA entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProperties {
    pub literal_context_bits: u32,
    pub literal_position_bits: u32,
    pub position_bits: u32,
    pub dict_size: u32,
}

impl LzmaProperties {
    /// Read the Zip LZMA header: version (2 bytes), properties size (2 bytes)
    /// then the properties byte and the dictionary size.
    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let major = reader.read_u8()?;
        let minor = reader.read_u8()?;
        let properties_size = reader.read_u16::<LittleEndian>()?;

        if properties_size < 5 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("LZMA properties too short: {} bytes", properties_size),
            ));
        }

        let mut properties = reader.read_u8()? as u32;
        let dict_size = reader.read_u32::<LittleEndian>()?;
        // Anything past the five known bytes is skipped.
        io::copy(
            &mut reader.by_ref().take(properties_size as u64 - 5),
            &mut io::sink(),
        )?;

        if properties >= 9 * 5 * 5 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid LZMA properties byte {}", properties),
            ));
        }

        let literal_context_bits = properties % 9;
        properties /= 9;
        let literal_position_bits = properties % 5;
        let position_bits = properties / 5;

        debug!(
            "LZMA SDK {}.{}: lc={} lp={} pb={} dict={}",
            major, minor, literal_context_bits, literal_position_bits, position_bits, dict_size
        );

        Ok(Self {
            literal_context_bits,
            literal_position_bits,
            position_bits,
            dict_size,
        })
    }

    pub fn properties_byte(&self) -> u8 {
        ((self.position_bits * 5 + self.literal_position_bits) * 9 + self.literal_context_bits)
            as u8
    }

    /// Header of the `.lzma` format describing the same stream.
    ///
    /// Without `uncompressed_size` the decoder stops at the end of stream
    /// marker.
    pub fn alone_header(&self, uncompressed_size: Option<u64>) -> [u8; LZMA_ALONE_HEADER_SIZE] {
        let mut header = [0u8; LZMA_ALONE_HEADER_SIZE];
        header[0] = self.properties_byte();
        header[1..5].copy_from_slice(&self.dict_size.to_le_bytes());
        header[5..].copy_from_slice(&uncompressed_size.unwrap_or(u64::MAX).to_le_bytes());
        header
    }
}

/// Wrap `reader`, which yields exactly the compressed bytes of an entry, in the
/// decoder of `compression_method`.
///
/// `uncompressed_size` is given for LZMA entries written without an end of
/// stream marker; it is ignored by the other methods.
pub fn decompressor<'a, R: Read + 'a>(
    compression_method: CompressionMethod,
    uncompressed_size: Option<u64>,
    mut reader: R,
) -> io::Result<Box<dyn Read + 'a>> {
    match compression_method {
        CompressionMethod::Store() => Ok(Box::new(reader)),
        CompressionMethod::Deflate() => Ok(Box::new(DeflateDecoder::new(reader))),
        CompressionMethod::Lzma() => {
            let properties = LzmaProperties::read(&mut reader)?;
            let header = Cursor::new(properties.alone_header(uncompressed_size));
            let stream = Stream::new_lzma_decoder(u64::MAX)?;
            Ok(Box::new(XzDecoder::new_stream(header.chain(reader), stream)))
        }
        CompressionMethod::Unknown(code) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported compression method {}", code),
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::write::DeflateEncoder;
    use std::io::Write;
    use xz2::stream::LzmaOptions;
    use xz2::write::XzEncoder;

    /// Zip LZMA data: SDK version, properties, then the stream of the `.lzma`
    /// format without its header.
    fn zip_lzma(data: &[u8]) -> Vec<u8> {
        let options = LzmaOptions::new_preset(6).unwrap();
        let mut encoder =
            XzEncoder::new_stream(Vec::new(), Stream::new_lzma_encoder(&options).unwrap());
        encoder.write_all(data).unwrap();
        let alone = encoder.finish().unwrap();

        let mut compressed = vec![9u8, 20, 5, 0];
        compressed.extend_from_slice(&alone[..5]);
        compressed.extend_from_slice(&alone[LZMA_ALONE_HEADER_SIZE..]);
        compressed
    }

    #[test]
    fn test_properties() {
        // lc=3 lp=0 pb=2, 64 KiB dictionary
        let header = [9u8, 4, 5, 0, 0x5d, 0x00, 0x00, 0x01, 0x00];
        let properties = LzmaProperties::read(&mut header.as_ref()).unwrap();

        assert_eq!(
            properties,
            LzmaProperties {
                literal_context_bits: 3,
                literal_position_bits: 0,
                position_bits: 2,
                dict_size: 1 << 16,
            }
        );
        assert_eq!(properties.properties_byte(), 0x5d);
        assert_eq!(
            properties.alone_header(Some(3)),
            [0x5d, 0, 0, 1, 0, 3, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(properties.alone_header(None)[5..], [0xff; 8]);
    }

    #[test]
    fn test_bad_properties() {
        let header = [9u8, 4, 5, 0, 225, 0x00, 0x00, 0x01, 0x00];
        let error = LzmaProperties::read(&mut header.as_ref()).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);

        let header = [9u8, 4, 2, 0, 0x5d, 0x00];
        assert!(LzmaProperties::read(&mut header.as_ref()).is_err());
    }

    #[test]
    fn test_lzma_decode_with_end_marker() {
        let data = b"lzma lzma lzma lzma lzma lzma lzma".repeat(20);
        let compressed = zip_lzma(&data);

        let mut decoded = Vec::new();
        decompressor(CompressionMethod::Lzma(), None, compressed.as_slice())
            .unwrap()
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_lzma_decode_known_size() {
        let data = b"sized sized sized sized sized".repeat(30);
        let compressed = zip_lzma(&data);

        let mut decoded = vec![0u8; data.len()];
        decompressor(
            CompressionMethod::Lzma(),
            Some(data.len() as u64),
            compressed.as_slice(),
        )
        .unwrap()
        .read_exact(&mut decoded)
        .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_deflate_from_another_encoder() {
        let data = b"hello hello hello hello";
        let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoded = Vec::new();
        decompressor(CompressionMethod::Deflate(), None, compressed.as_slice())
            .unwrap()
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_unknown_method() {
        let error = decompressor(CompressionMethod::Unknown(12), None, b"".as_ref()).err();
        assert_eq!(error.map(|e| e.kind()), Some(io::ErrorKind::Unsupported));
    }
}
