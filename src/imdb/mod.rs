//! IMDb list dump import.
//!
//! Ties the generic pieces together for the IMDb plain-text dumps:
//!
//! 1. Sort every dump by title, one independent pipeline per dump on its
//!    own thread (`Loader::sort_all`)
//! 2. Join the sorted movies list with genres, alternate titles, ratings,
//!    plots and known global ids (`Loader::import`)
//! 3. Commit the composite records, and any newly allocated ids, to sinks
//!
//! ## File layout
//!
//! Dumps are read from the source directory under their list names
//! (`movies.list`, `genres.list`, ...). Sorted outputs are written to the
//! work directory as `<dataset>.sorted` and left for the caller to delete.
//! The media-id list is optional; without it every title gets a new id.

pub mod codec;
pub mod sink;
pub mod title;

pub use codec::{AkaCodec, PlotCodec, RatingCodec, TabbedCodec};
pub use sink::{BatchWriter, JsonLinesSink, RecordSink};
pub use title::{MediaKind, TitleRecord};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::join::{MergeJoin, Secondary, SortedStreamCursor};
use crate::progress::Progress;
use crate::record::{ByKey, Keyed, RecordCodec};
use crate::sort::{ExternalSorter, SortDefinition, SortStats};
use codec::TabbedRecord;
use rand::Rng;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Composite records between progress log lines.
const LOG_INTERVAL: u64 = 100_000;

fn dashes(n: usize) -> String {
    "-".repeat(n)
}

fn panicked(dataset: Dataset) -> Error {
    Error::Io(io::Error::other(format!("{} pipeline panicked", dataset.name())))
}

/// One IMDb list dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    /// `movies.list`, the primary stream.
    Movies,
    /// `genres.list`.
    Genres,
    /// `aka-titles.list`.
    AlsoKnownAs,
    /// `ratings.list`.
    Ratings,
    /// `plot.list`.
    Plots,
    /// Known title to global id mapping, tab separated.
    MediaIds,
}

impl Dataset {
    /// Every dataset, primary first.
    pub const ALL: [Dataset; 6] = [
        Dataset::Movies,
        Dataset::Genres,
        Dataset::AlsoKnownAs,
        Dataset::Ratings,
        Dataset::Plots,
        Dataset::MediaIds,
    ];

    /// Short name used in logs, progress and sorted file names.
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Movies => "movies",
            Dataset::Genres => "genres",
            Dataset::AlsoKnownAs => "aka-titles",
            Dataset::Ratings => "ratings",
            Dataset::Plots => "plots",
            Dataset::MediaIds => "media-ids",
        }
    }

    /// File name of the dump in the source directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Dataset::Movies => "movies.list",
            Dataset::Genres => "genres.list",
            Dataset::AlsoKnownAs => "aka-titles.list",
            Dataset::Ratings => "ratings.list",
            Dataset::Plots => "plot.list",
            Dataset::MediaIds => "media-ids.tsv",
        }
    }

    /// Record delimiter.
    pub fn delimiter(&self) -> Vec<u8> {
        match self {
            Dataset::AlsoKnownAs => b"\n\n".to_vec(),
            Dataset::Plots => format!("\n\n{}\n", dashes(79)).into_bytes(),
            _ => b"\n".to_vec(),
        }
    }

    /// Text that ends the dump header.
    pub fn start_anchor(&self) -> Option<Vec<u8>> {
        let anchor = match self {
            Dataset::Movies => "MOVIES LIST\n===========\n\n".to_string(),
            Dataset::Genres => "8: THE GENRES LIST\n==================\n\n".to_string(),
            Dataset::AlsoKnownAs => "AKA TITLES LIST\n===============\n\n\n\n".to_string(),
            Dataset::Ratings => {
                "MOVIE RATINGS REPORT\n\nNew  Distribution  Votes  Rank  Title\n".to_string()
            }
            Dataset::Plots => "PLOT SUMMARIES LIST\n===================\n\n".to_string(),
            Dataset::MediaIds => return None,
        };
        Some(anchor.into_bytes())
    }

    /// Text that starts the dump footer.
    pub fn end_anchor(&self) -> Option<Vec<u8>> {
        let anchor = match self {
            Dataset::Movies => format!("\n{}", dashes(80)),
            Dataset::AlsoKnownAs => format!("\n{}", dashes(77)),
            Dataset::Ratings => format!("\n\n{}\n\nREPORT FORMAT\n=============\n\n", dashes(78)),
            Dataset::Genres | Dataset::Plots | Dataset::MediaIds => return None,
        };
        Some(anchor.into_bytes())
    }

    /// Whether an import can run without this dump.
    pub fn is_optional(&self) -> bool {
        matches!(self, Dataset::MediaIds)
    }
}

/// Allocates random global ids in the canonical UUID v4 text form.
#[derive(Debug, Default)]
pub struct MediaIdAllocator {
    allocated: u64,
}

impl MediaIdAllocator {
    /// Creates an allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new random id.
    pub fn allocate(&mut self) -> String {
        let mut rng = rand::rng();
        let mut v: u128 = rng.random();
        // version 4, RFC 4122 variant
        v = (v & !(0xF << 76)) | (0x4 << 76);
        v = (v & !(0x3 << 62)) | (0x2 << 62);
        self.allocated += 1;

        format!(
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            v >> 96,
            (v >> 80) & 0xFFFF,
            (v >> 64) & 0xFFFF,
            (v >> 48) & 0xFFFF,
            v & 0xFFFF_FFFF_FFFF
        )
    }

    /// Ids allocated so far.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}

/// A title to global id mapping created during an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaIdEntry {
    /// Full title key.
    pub title: String,
    /// The allocated id.
    pub global_id: String,
}

/// Counters for one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Composite records committed.
    pub records: u64,
    /// New global ids committed.
    pub ids_created: u64,
    /// Records that inherited from their series.
    pub inherited: u64,
    /// Wall time of the join and commit phase.
    pub elapsed: Duration,
}

/// Sorts and joins a directory of IMDb dumps.
pub struct Loader {
    source_dir: PathBuf,
    work_dir: PathBuf,
    options: Options,
    progress: Progress,
}

impl Loader {
    /// Creates a loader reading dumps from `source_dir` and writing sorted
    /// files to `work_dir`.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        options: Options,
    ) -> Result<Self> {
        options.validate()?;
        let work_dir = work_dir.into();
        if !work_dir.is_dir() {
            return Err(Error::invalid_configuration(format!(
                "work_dir is not a directory: {:?}",
                work_dir
            )));
        }
        Ok(Self { source_dir: source_dir.into(), work_dir, options, progress: Progress::new() })
    }

    /// Shared progress of the sort pipelines.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Path of the dump for `dataset`.
    pub fn input(&self, dataset: Dataset) -> PathBuf {
        self.source_dir.join(dataset.file_name())
    }

    /// Path of the sorted output for `dataset`.
    pub fn sorted(&self, dataset: Dataset) -> PathBuf {
        self.work_dir.join(format!("{}.sorted", dataset.name()))
    }

    /// Sorts one dataset.
    pub fn sort(&self, dataset: Dataset) -> Result<SortStats> {
        match dataset {
            Dataset::Movies | Dataset::Genres | Dataset::MediaIds => {
                self.sort_with(dataset, TabbedCodec)
            }
            Dataset::AlsoKnownAs => self.sort_with(dataset, AkaCodec),
            Dataset::Ratings => self.sort_with(dataset, RatingCodec),
            Dataset::Plots => self.sort_with(dataset, PlotCodec),
        }
    }

    fn sort_with<C>(&self, dataset: Dataset, codec: C) -> Result<SortStats>
    where
        C: RecordCodec,
        C::Item: Keyed,
    {
        let mut def = SortDefinition::new(
            dataset.name(),
            self.input(dataset),
            self.sorted(dataset),
            dataset.delimiter(),
            codec,
            ByKey,
        )
        .options(self.options.clone());
        def.start_anchor = dataset.start_anchor();
        def.end_anchor = dataset.end_anchor();

        ExternalSorter::new(def)?.run_with_progress(&self.progress)
    }

    /// Sorts every present dump concurrently and returns each outcome.
    ///
    /// A missing optional dump is skipped. A failure in one pipeline does not
    /// stop the others.
    pub fn sort_all(&self) -> Vec<(Dataset, Result<SortStats>)> {
        let datasets: Vec<Dataset> = Dataset::ALL
            .into_iter()
            .filter(|d| {
                let present = self.input(*d).exists();
                if !present && d.is_optional() {
                    log::info!("No {} dump at {:?}, skipping", d.name(), self.input(*d));
                }
                present || !d.is_optional()
            })
            .collect();

        log::info!("Sorting {} datasets", datasets.len());
        let outcome = crossbeam::scope(|scope| {
            let handles: Vec<_> = datasets
                .iter()
                .map(|&dataset| (dataset, scope.spawn(move |_| self.sort(dataset))))
                .collect();

            handles
                .into_iter()
                .map(|(dataset, handle)| {
                    let result = handle.join().unwrap_or_else(|_| Err(panicked(dataset)));
                    (dataset, result)
                })
                .collect::<Vec<_>>()
        });

        match outcome {
            Ok(results) => results,
            Err(_) => datasets.into_iter().map(|d| (d, Err(panicked(d)))).collect(),
        }
    }

    /// Opens a sorted stream, or an empty one for a skipped optional dump.
    fn cursor<C>(&self, dataset: Dataset, codec: C) -> Result<SortedStreamCursor<Box<dyn Read>, C>>
    where
        C: RecordCodec,
        C::Item: Keyed,
    {
        let path = self.sorted(dataset);
        let reader: Box<dyn Read> = if dataset.is_optional() && !path.exists() {
            Box::new(io::empty())
        } else {
            Box::new(BufReader::new(File::open(&path)?))
        };
        SortedStreamCursor::new(reader, &dataset.delimiter(), codec, self.options.read_buffer_size)
    }

    /// Joins the sorted datasets and commits the composite records to
    /// `titles` and newly allocated ids to `ids`.
    pub fn import<S, I>(&self, titles: S, ids: I) -> Result<ImportStats>
    where
        S: RecordSink<TitleRecord>,
        I: RecordSink<MediaIdEntry>,
    {
        let started = Instant::now();
        let batch_size = self.options.sink_batch_size;
        let mut titles = BatchWriter::new(titles, batch_size)?;
        let mut ids = BatchWriter::new(ids, batch_size)?;

        let mut allocator = MediaIdAllocator::new();
        let movies = self.cursor(Dataset::Movies, TabbedCodec)?;
        let mut join = MergeJoin::new(movies, TitleRecord::from_movie)
            .with_secondary(Secondary::new(
                Dataset::MediaIds.name(),
                self.cursor(Dataset::MediaIds, TabbedCodec)?,
                move |record: &mut TitleRecord, found: Vec<TabbedRecord>| {
                    record.assign_media_id(found, || allocator.allocate())
                },
            ))
            .with_secondary(Secondary::new(
                Dataset::Genres.name(),
                self.cursor(Dataset::Genres, TabbedCodec)?,
                TitleRecord::add_genres,
            ))
            .with_secondary(Secondary::new(
                Dataset::AlsoKnownAs.name(),
                self.cursor(Dataset::AlsoKnownAs, AkaCodec)?,
                TitleRecord::add_also_known_as,
            ))
            .with_secondary(Secondary::new(
                Dataset::Ratings.name(),
                self.cursor(Dataset::Ratings, RatingCodec)?,
                TitleRecord::set_rating,
            ))
            .with_secondary(Secondary::new(
                Dataset::Plots.name(),
                self.cursor(Dataset::Plots, PlotCodec)?,
                TitleRecord::add_plots,
            ));

        log::info!("Importing titles");
        let mut stats = ImportStats::default();
        for record in &mut join {
            let record = record?;
            if record.new_media_id {
                if let Some(global_id) = &record.media_id {
                    ids.push(MediaIdEntry { title: record.title(), global_id: global_id.clone() })?;
                    stats.ids_created += 1;
                }
            }
            titles.push(record)?;
            stats.records += 1;

            if stats.records % LOG_INTERVAL == 0 {
                log::info!(
                    "{} titles imported and {} ids created in {:?}",
                    stats.records,
                    stats.ids_created,
                    started.elapsed()
                );
            }
        }

        titles.finish()?;
        ids.finish()?;

        stats.inherited = join.stats().inherited;
        stats.elapsed = started.elapsed();
        log::info!(
            "Import completed: {} titles imported and {} ids created in {:?}",
            stats.records,
            stats.ids_created,
            stats.elapsed
        );
        Ok(stats)
    }

    /// Sorts every dump, then imports. Fails with the first sort error.
    pub fn run<S, I>(&self, titles: S, ids: I) -> Result<ImportStats>
    where
        S: RecordSink<TitleRecord>,
        I: RecordSink<MediaIdEntry>,
    {
        let mut first_error = None;
        for (dataset, result) in self.sort_all() {
            if let Err(e) = result {
                log::error!("Sorting {} failed: {}", dataset.name(), e);
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        log::info!("All datasets sorted: {}", self.progress.summary());

        self.import(titles, ids)
    }

    /// Source directory.
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}
