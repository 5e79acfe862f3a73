use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use log::debug;
use xz2::stream::{LzmaOptions, Stream};
use xz2::write::XzEncoder;

use crate::compress::FileOptions;
use crate::compression::{CompressionMethod, Level};
use crate::constants::{
    BUFFER_SIZE, LZMA_ALONE_HEADER_SIZE, LZMA_PROPERTIES_SIZE, LZMA_SDK_VERSION,
};

/// Fast routine for detection of plain text
///  (ASCII or an ASCII-compatible extension such as ISO-8859, UTF-8, etc.)
/// Author: Cosmin Truta.
///
/// See "proginfo/txtvsbin.txt" for more information.
pub fn is_text_buf(buffer: &[u8]) -> bool {
    let mut result = false;
    for c in buffer {
        if *c >= 32 {
            result = true;
        } else if (*c <= 6) || (14..=25).contains(c) || (28..=31).contains(c) {
            return false; // black-listed character found; stop
        }
    }
    result
}

/// Outcome of compressing one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressResult {
    pub uncompressed_size: u64,
    pub is_text: bool,
}

fn pump<R, W>(writer: &mut W, reader: &mut R, hasher: &mut Hasher) -> io::Result<CompressResult>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0; BUFFER_SIZE];
    let mut total_read = 0u64;
    let mut is_text = None;

    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if is_text.is_none() {
            is_text = Some(is_text_buf(&buf[..read]));
        }
        total_read += read as u64;
        hasher.update(&buf[..read]);
        writer.write_all(&buf[..read])?;
    }

    Ok(CompressResult {
        uncompressed_size: total_read,
        is_text: is_text.unwrap_or(false),
    })
}

/// Rewrites the `.lzma` header liblzma emits into the header of a Zip LZMA
/// entry: SDK version, properties size, properties byte and dictionary size.
/// The uncompressed size of the `.lzma` header is dropped.
struct ZipLzmaHeader<W: Write> {
    inner: W,
    header: Vec<u8>,
}

impl<W: Write> ZipLzmaHeader<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            header: Vec::with_capacity(LZMA_ALONE_HEADER_SIZE),
        }
    }
}

impl<W: Write> Write for ZipLzmaHeader<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.header.len() == LZMA_ALONE_HEADER_SIZE {
            return self.inner.write(buf);
        }

        let taken = buf.len().min(LZMA_ALONE_HEADER_SIZE - self.header.len());
        self.header.extend_from_slice(&buf[..taken]);
        if self.header.len() == LZMA_ALONE_HEADER_SIZE {
            self.inner.write_all(&LZMA_SDK_VERSION)?;
            self.inner.write_all(&LZMA_PROPERTIES_SIZE.to_le_bytes())?;
            self.inner
                .write_all(&self.header[..LZMA_PROPERTIES_SIZE as usize])?;
        }
        Ok(taken)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Compress `reader` into `writer`, feeding the uncompressed bytes to `hasher`.
///
/// The caller only passes methods that can be written.
pub fn compress<R, W>(
    compression_method: CompressionMethod,
    writer: &mut W,
    reader: &mut R,
    hasher: &mut Hasher,
    compression_level: Level,
) -> io::Result<CompressResult>
where
    R: Read + ?Sized,
    W: Write,
{
    match compression_method {
        CompressionMethod::Store() => pump(writer, reader, hasher),
        CompressionMethod::Deflate() => {
            let mut encoder = DeflateEncoder::new(writer, compression_level.into());
            let result = pump(&mut encoder, reader, hasher)?;
            encoder.finish()?;
            Ok(result)
        }
        CompressionMethod::Lzma() => {
            let options = LzmaOptions::new_preset(compression_level.lzma_preset())?;
            let stream = Stream::new_lzma_encoder(&options)?;
            let mut encoder = XzEncoder::new_stream(ZipLzmaHeader::new(writer), stream);
            let result = pump(&mut encoder, reader, hasher)?;
            encoder.finish()?.flush()?;
            Ok(result)
        }
        other => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot compress with {}", other),
        )),
    }
}

/// A file compressed ahead of the archive, held in an anonymous temporary file.
#[derive(Debug)]
pub struct CompressedFile {
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub is_text: bool,
    /// Compressed data, positioned at its start.
    pub data: File,
}

/// Compress the file at `path` with `options` into a temporary file.
///
/// With `store_if_larger`, output that does not shrink is replaced by the
/// stored file.
pub fn compress_file(path: &Path, options: &FileOptions) -> io::Result<CompressedFile> {
    let mut source = File::open(path)?;
    let mut data = tempfile::tempfile()?;
    let mut compression_method = options.effective_compression_method();

    let mut hasher = Hasher::new();
    let mut result = compress(
        compression_method,
        &mut data,
        &mut source,
        &mut hasher,
        options.compression_level,
    )?;
    let compressed_size = data.stream_position()?;

    if options.store_if_larger
        && compression_method != CompressionMethod::Store()
        && compressed_size >= result.uncompressed_size
    {
        debug!("{} does not shrink, storing it", path.display());
        compression_method = CompressionMethod::Store();
        source.seek(SeekFrom::Start(0))?;
        data.set_len(0)?;
        data.seek(SeekFrom::Start(0))?;
        hasher = Hasher::new();
        result = compress(
            compression_method,
            &mut data,
            &mut source,
            &mut hasher,
            Level::None,
        )?;
    }

    data.seek(SeekFrom::Start(0))?;
    Ok(CompressedFile {
        compression_method,
        crc32: hasher.finalize(),
        uncompressed_size: result.uncompressed_size,
        is_text: result.is_text,
        data,
    })
}
