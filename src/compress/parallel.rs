use std::io;
use std::path::Path;
use std::thread;

use log::debug;

use super::archive::{ArchiveWriter, SourceEntry};
use super::compressor::{compress_file, CompressedFile};
use super::write_wrapper::ArchiveSink;
use crate::error::ArchiveError;

/// Sources compressed ahead of the writer per worker.
const BATCH_PER_WORKER: usize = 16;

impl<W: ArchiveSink> ArchiveWriter<W> {
    /// Add the filesystem tree rooted at `source_path` like [`add`](Self::add()),
    /// compressing regular files with `threads` workers.
    ///
    /// Each file is compressed into its own temporary file; entries are then
    /// written in the same order as `add` writes them.
    pub fn add_parallel<P: AsRef<Path>>(
        &mut self,
        source_path: P,
        archive_name: &str,
        threads: usize,
    ) -> Result<usize, ArchiveError> {
        let sources = self.walk_source(source_path.as_ref(), archive_name)?;
        let threads = threads.max(1);
        debug!(
            "adding {} entries with {} workers",
            sources.len(),
            threads
        );

        for batch in sources.chunks(threads * BATCH_PER_WORKER) {
            let compressed = self.compress_batch(batch, threads)?;
            for (source, compressed) in batch.iter().zip(compressed) {
                let compressed = compressed
                    .transpose()
                    .map_err(|error| self.source_io(source, error))?;
                self.append_source(source, compressed)?;
            }
        }

        Ok(sources.len())
    }

    /// Compress the regular files of `batch`, one slot per source.
    fn compress_batch(
        &self,
        batch: &[SourceEntry],
        threads: usize,
    ) -> Result<Vec<Option<io::Result<CompressedFile>>>, ArchiveError> {
        let files: Vec<(usize, &SourceEntry)> = batch
            .iter()
            .enumerate()
            .filter(|(_, source)| source.is_file())
            .collect();
        let threads = threads.clamp(1, files.len().max(1));

        let worker_results: Vec<io::Result<Vec<(usize, io::Result<CompressedFile>)>>> =
            thread::scope(|scope| {
                let workers: Vec<_> = (0..threads)
                    .map(|worker| {
                        let share: Vec<(usize, &SourceEntry)> =
                            files.iter().skip(worker).step_by(threads).copied().collect();
                        let options: Vec<_> = share
                            .iter()
                            .map(|(_, source)| self.source_options(source))
                            .collect();

                        scope.spawn(move || {
                            share
                                .into_iter()
                                .zip(options)
                                .map(|((position, source), options)| {
                                    (position, compress_file(&source.path, &options))
                                })
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();

                workers
                    .into_iter()
                    .map(|worker| {
                        worker.join().map_err(|_| {
                            io::Error::new(io::ErrorKind::Other, "compression worker panicked")
                        })
                    })
                    .collect()
            });

        let mut compressed: Vec<Option<io::Result<CompressedFile>>> =
            batch.iter().map(|_| None).collect();
        for worker_result in worker_results {
            for (position, result) in worker_result? {
                compressed[position] = Some(result);
            }
        }
        Ok(compressed)
    }

    fn source_io(&self, source: &SourceEntry, error: io::Error) -> ArchiveError {
        ArchiveError::EntryIo {
            name: source.name.clone(),
            offset: self.get_archive_size(),
            source: error,
        }
    }
}
