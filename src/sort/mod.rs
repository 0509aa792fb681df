//! External merge sort of one delimited dataset.
//!
//! ## Process
//!
//! 1. Locate the payload between the dataset's anchors (`record::boundary`)
//! 2. Split the payload into records chunk by chunk (`record::splitter`)
//! 3. Decode, sort and spill each chunk as a run file (`run.rs`)
//! 4. Merge all runs through a binary-heap frontier (`merge.rs`)
//! 5. Rename the merged output into place
//!
//! Every phase is a single forward pass with bounded buffers. Run files are
//! deleted on every exit path; the output appears only once the sort has
//! succeeded.

pub mod merge;
pub mod run;

pub use merge::RunMerger;
pub use run::{RunFile, RunSorter, RunStats, RunWriter};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::progress::{Phase, Progress};
use crate::record::{locate, Comparator, RecordCodec, RecordSplitter};
use bytes::BytesMut;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Everything needed to sort one dataset.
#[derive(Debug, Clone)]
pub struct SortDefinition<C, K> {
    /// Dataset name, used for logging and progress.
    pub name: String,
    /// Source dump.
    pub input: PathBuf,
    /// Destination of the sorted stream.
    pub output: PathBuf,
    /// Record delimiter. Must not be empty.
    pub delimiter: Vec<u8>,
    /// Marks the end of the header. `None` means the payload starts at 0.
    pub start_anchor: Option<Vec<u8>>,
    /// Marks the start of the footer. `None` means end of file.
    pub end_anchor: Option<Vec<u8>>,
    /// Record codec.
    pub codec: C,
    /// Record order.
    pub comparator: K,
    /// Tuning options.
    pub options: Options,
}

impl<C, K> SortDefinition<C, K> {
    /// Creates a definition with no anchors and default options.
    pub fn new(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        delimiter: impl Into<Vec<u8>>,
        codec: C,
        comparator: K,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            delimiter: delimiter.into(),
            start_anchor: None,
            end_anchor: None,
            codec,
            comparator,
            options: Options::default(),
        }
    }

    /// Sets the start anchor.
    pub fn start_anchor(mut self, anchor: impl Into<Vec<u8>>) -> Self {
        self.start_anchor = Some(anchor.into());
        self
    }

    /// Sets the end anchor.
    pub fn end_anchor(mut self, anchor: impl Into<Vec<u8>>) -> Self {
        self.end_anchor = Some(anchor.into());
        self
    }

    /// Sets the tuning options.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Checks the definition before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(Error::invalid_configuration(format!(
                "{}: delimiter must not be empty",
                self.name
            )));
        }
        if self.start_anchor.as_ref().is_some_and(|a| a.is_empty()) {
            return Err(Error::invalid_configuration(format!(
                "{}: start anchor must not be empty",
                self.name
            )));
        }
        if self.end_anchor.as_ref().is_some_and(|a| a.is_empty()) {
            return Err(Error::invalid_configuration(format!(
                "{}: end anchor must not be empty",
                self.name
            )));
        }
        if self.input == self.output {
            return Err(Error::invalid_configuration(format!(
                "{}: output must differ from input {:?}",
                self.name, self.input
            )));
        }
        self.options.validate()
    }
}

/// Counters for one completed sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Raw records split out of the payload.
    pub records_read: u64,
    /// Records dropped because they failed to decode.
    pub records_dropped: u64,
    /// Records in the sorted output.
    pub records_written: u64,
    /// Run files written.
    pub runs: usize,
    /// Payload size in bytes.
    pub payload_bytes: u64,
    /// Wall time of the whole sort.
    pub elapsed: Duration,
}

/// Sorts one dataset that may be larger than memory.
pub struct ExternalSorter<C, K> {
    def: SortDefinition<C, K>,
}

impl<C, K> ExternalSorter<C, K>
where
    C: RecordCodec,
    K: Comparator<C::Item>,
{
    /// Creates a sorter after validating the definition.
    pub fn new(def: SortDefinition<C, K>) -> Result<Self> {
        def.validate()?;
        Ok(Self { def })
    }

    /// The dataset definition.
    pub fn definition(&self) -> &SortDefinition<C, K> {
        &self.def
    }

    /// Sorts the input into the output file.
    pub fn run(&self) -> Result<SortStats> {
        self.persist(None)
    }

    /// Sorts the input into the output file, reporting into `progress`
    /// under the dataset name.
    pub fn run_with_progress(&self, progress: &Progress) -> Result<SortStats> {
        let result = self.persist(Some(progress));
        let phase = if result.is_ok() { Phase::Done } else { Phase::Failed };
        progress.set_phase(&self.def.name, phase);
        result
    }

    /// Sorts the input and writes the delimiter-terminated records to `out`.
    pub fn sort_to_writer<W: Write>(&self, out: &mut W) -> Result<SortStats> {
        self.sort_into(out, None)
    }

    /// Writes the sorted stream to a temporary file beside the output and
    /// renames it into place.
    fn persist(&self, progress: Option<&Progress>) -> Result<SortStats> {
        let dir = output_dir(&self.def.output);
        let temp = tempfile::Builder::new().prefix(".flatjoin-").suffix(".tmp").tempfile_in(dir)?;

        let mut writer = BufWriter::with_capacity(self.def.options.write_buffer_size, temp);
        let stats = match self.sort_into(&mut writer, progress) {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("Sort of {} failed: {}", self.def.name, e);
                return Err(e);
            }
        };

        let temp = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        temp.as_file().sync_all()?;
        temp.persist(&self.def.output).map_err(|e| Error::Io(e.error))?;

        log::info!("Wrote sorted {} to {:?}", self.def.name, self.def.output);
        Ok(stats)
    }

    fn sort_into<W: Write>(&self, out: &mut W, progress: Option<&Progress>) -> Result<SortStats> {
        let started = Instant::now();
        let def = &self.def;
        let options = &def.options;
        let report = |f: &dyn Fn(&mut crate::progress::DatasetProgress)| {
            if let Some(progress) = progress {
                progress.update(&def.name, |p| f(p));
            }
        };

        log::info!("Starting sort of {}: {:?}", def.name, def.input);
        report(&|p| p.phase = Phase::Locating);

        let mut file = File::open(&def.input)?;
        let boundary = locate(
            &mut file,
            def.start_anchor.as_deref(),
            def.end_anchor.as_deref(),
            options.scan_window_size,
        )?;
        file.seek(SeekFrom::Start(boundary.start))?;
        report(&|p| {
            p.phase = Phase::Sorting;
            p.bytes_total = boundary.len();
        });

        // Split and spill runs
        let payload = file.take(boundary.len());
        let mut splitter = RecordSplitter::new(payload, &def.delimiter, options.chunk_size)?;
        let mut sorter = RunSorter::new(
            &def.codec,
            &def.comparator,
            &def.delimiter,
            options.temp_dir.as_deref(),
            options.write_buffer_size,
        );
        while let Some(batch) = splitter.next_batch()? {
            if batch.is_empty() {
                continue;
            }
            sorter.sort_batch(batch)?;
            let (done, runs) = (splitter.bytes_consumed(), sorter.runs_written());
            report(&|p| {
                p.bytes_done = done;
                p.runs = runs;
            });
        }
        let (runs, run_stats) = sorter.finish();

        // Merge runs into the output
        report(&|p| p.phase = Phase::Merging);
        let mut merger = RunMerger::open(
            runs,
            &def.codec,
            &def.comparator,
            &def.delimiter,
            options.read_buffer_size,
        )?;
        let mut scratch = BytesMut::new();
        let mut written = 0u64;
        for item in &mut merger {
            let item = item?;
            scratch.clear();
            def.codec.encode(&item, &mut scratch);
            out.write_all(&scratch)?;
            out.write_all(&def.delimiter)?;
            written += 1;
        }
        out.flush()?;
        let skipped = merger.skipped();
        merger.finish()?;

        let stats = SortStats {
            records_read: run_stats.records_read,
            records_dropped: run_stats.records_dropped + skipped,
            records_written: written,
            runs: run_stats.runs,
            payload_bytes: boundary.len(),
            elapsed: started.elapsed(),
        };

        log::info!(
            "Sorted {}: {} records read, {} dropped, {} written from {} runs in {:?}",
            def.name,
            stats.records_read,
            stats.records_dropped,
            stats.records_written,
            stats.runs,
            stats.elapsed
        );
        Ok(stats)
    }
}

/// Directory the output is created in.
fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
