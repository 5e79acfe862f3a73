use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};

/// A seekable output an archive can be written to.
///
/// On top of [`Write`] and [`Seek`], the sink must be able to drop the bytes
/// left after the archive end and to persist its content.
pub trait ArchiveSink: Write + Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

impl ArchiveSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl ArchiveSink for Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ArchiveSink + ?Sized> ArchiveSink for &mut S {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Keeps track of the position in the sink, so the archive never has to ask it.
#[derive(Debug)]
pub struct WriteSeekWrapper<W: ArchiveSink> {
    writer: W,
    position: u64,
}

impl<W: ArchiveSink> WriteSeekWrapper<W> {
    pub fn new(writer: W) -> WriteSeekWrapper<W> {
        Self {
            writer,
            position: 0,
        }
    }

    pub fn get_written_bytes_count(&self) -> u64 {
        self.position
    }

    /// Write `buf` at `offset` and come back to the current position.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let end = self.position;
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)?;
        self.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Move back to `offset`, the bytes after it will be overwritten or truncated.
    pub fn rewind_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    /// Drop everything after the current position and persist the sink.
    pub fn truncate_and_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.truncate(self.position)?;
        self.writer.sync()
    }

    pub fn retrieve_writer(self) -> W {
        self.writer
    }
}

impl<W: ArchiveSink> Write for WriteSeekWrapper<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W: ArchiveSink> Seek for WriteSeekWrapper<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.writer.seek(pos)?;
        Ok(self.position)
    }
}
