//! Sorted runs.
//!
//! A run is one in-memory batch of records, decoded, sorted and written to a
//! temporary file with each record followed by the dataset delimiter. Run
//! files are owned through `tempfile::TempPath`, so they are deleted when
//! the owning `RunFile` is dropped, on success and on every error path.

use crate::error::{Error, Result};
use crate::record::{Comparator, RecordCodec};
use bytes::{Bytes, BytesMut};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::{NamedTempFile, TempPath};

/// A finished run file on disk.
#[derive(Debug)]
pub struct RunFile {
    path: TempPath,
    records: usize,
    bytes: u64,
}

impl RunFile {
    /// Path of the run file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in the run.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Size of the run file in bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Deletes the run file now, reporting failure instead of ignoring it.
    pub fn remove(self) -> Result<()> {
        self.path.close().map_err(Error::Io)
    }
}

/// Writes delimiter-terminated records to a new temporary file.
pub struct RunWriter {
    writer: BufWriter<NamedTempFile>,
    records: usize,
    bytes: u64,
}

impl RunWriter {
    /// Creates a run file in `dir`, or the system temp directory.
    pub fn create(dir: Option<&Path>, buffer_size: usize) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("run-").suffix(".tmp");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        Ok(Self { writer: BufWriter::with_capacity(buffer_size, file), records: 0, bytes: 0 })
    }

    /// Appends one encoded record and the delimiter.
    pub fn append(&mut self, record: &[u8], delimiter: &[u8]) -> Result<()> {
        self.writer.write_all(record)?;
        self.writer.write_all(delimiter)?;
        self.records += 1;
        self.bytes += (record.len() + delimiter.len()) as u64;
        Ok(())
    }

    /// Flushes the run and closes its handle. The file lives on until the
    /// returned `RunFile` is dropped.
    pub fn finish(self) -> Result<RunFile> {
        let file = self.writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        Ok(RunFile { path: file.into_temp_path(), records: self.records, bytes: self.bytes })
    }
}

/// Counters from the run generation phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Raw records received from the splitter.
    pub records_read: u64,
    /// Records dropped because they failed to decode.
    pub records_dropped: u64,
    /// Runs written.
    pub runs: usize,
}

/// Turns batches of raw records into sorted run files.
pub struct RunSorter<'a, C, K> {
    codec: &'a C,
    comparator: &'a K,
    delimiter: &'a [u8],
    temp_dir: Option<&'a Path>,
    buffer_size: usize,
    runs: Vec<RunFile>,
    stats: RunStats,
    scratch: BytesMut,
}

impl<'a, C, K> RunSorter<'a, C, K>
where
    C: RecordCodec,
    K: Comparator<C::Item>,
{
    /// Creates a run sorter.
    pub fn new(
        codec: &'a C,
        comparator: &'a K,
        delimiter: &'a [u8],
        temp_dir: Option<&'a Path>,
        buffer_size: usize,
    ) -> Self {
        Self {
            codec,
            comparator,
            delimiter,
            temp_dir,
            buffer_size,
            runs: Vec::new(),
            stats: RunStats::default(),
            scratch: BytesMut::new(),
        }
    }

    /// Decodes, sorts and writes one batch as a new run.
    ///
    /// Records that fail to decode are dropped. A batch with no decodable
    /// records writes no run.
    pub fn sort_batch(&mut self, batch: Vec<Bytes>) -> Result<()> {
        self.stats.records_read += batch.len() as u64;

        let mut dropped = 0u64;
        let mut items = Vec::with_capacity(batch.len());
        for raw in batch {
            if raw.is_empty() {
                dropped += 1;
                continue;
            }
            let preview = raw.clone();
            match self.codec.decode(raw) {
                Some(item) => items.push(item),
                None => {
                    dropped += 1;
                    log::debug!("Dropping record: {}", Error::malformed(&preview));
                }
            }
        }

        if dropped > 0 {
            self.stats.records_dropped += dropped;
            log::warn!("Dropped {} undecodable records in run {}", dropped, self.runs.len());
        }
        if items.is_empty() {
            return Ok(());
        }

        let comparator = self.comparator;
        items.sort_unstable_by(|a, b| comparator.compare(a, b));

        let mut writer = RunWriter::create(self.temp_dir, self.buffer_size)?;
        for item in &items {
            self.scratch.clear();
            self.codec.encode(item, &mut self.scratch);
            writer.append(&self.scratch, self.delimiter)?;
        }
        let run = writer.finish()?;

        log::debug!(
            "Wrote run {} with {} records ({} bytes)",
            self.runs.len(),
            run.records(),
            run.bytes()
        );
        self.runs.push(run);
        self.stats.runs = self.runs.len();
        Ok(())
    }

    /// Runs written so far.
    pub fn runs_written(&self) -> usize {
        self.runs.len()
    }

    /// Returns the run files and counters.
    pub fn finish(self) -> (Vec<RunFile>, RunStats) {
        (self.runs, self.stats)
    }
}
