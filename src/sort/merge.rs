//! K-way run merger.
//!
//! This module provides an iterator that merges sorted run files into a
//! single sorted stream.
//!
//! Every run file is opened before merging begins. The frontier holds at most
//! one head record per open run in a binary heap ordered by the dataset
//! comparator; popping the minimum and refilling from the same run yields the
//! global order. A run leaves the frontier exactly when it is exhausted. The
//! merger owns the run files, so they are deleted when it is dropped.

use super::run::RunFile;
use crate::error::Result;
use crate::record::{Comparator, DelimitedReader, RecordCodec};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::BufReader;

/// Entry in the merge frontier
struct FrontierEntry<'a, T, K> {
    item: T,
    run: usize,
    comparator: &'a K,
}

impl<T, K: Comparator<T>> PartialEq for FrontierEntry<'_, T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, K: Comparator<T>> Eq for FrontierEntry<'_, T, K> {}

impl<T, K: Comparator<T>> PartialOrd for FrontierEntry<'_, T, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, K: Comparator<T>> Ord for FrontierEntry<'_, T, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest item first)
        self.comparator.compare(&other.item, &self.item).then_with(|| {
            // For equal items, prefer the earlier run
            other.run.cmp(&self.run)
        })
    }
}

/// Multi-way merge iterator over sorted run files.
pub struct RunMerger<'a, C: RecordCodec, K> {
    codec: &'a C,
    comparator: &'a K,
    frontier: BinaryHeap<FrontierEntry<'a, C::Item, K>>,
    readers: Vec<DelimitedReader<BufReader<File>>>,
    runs: Vec<RunFile>,
    skipped: u64,
    failed: bool,
}

impl<'a, C, K> RunMerger<'a, C, K>
where
    C: RecordCodec,
    K: Comparator<C::Item>,
{
    /// Opens every run and loads its head record into the frontier.
    pub fn open(
        runs: Vec<RunFile>,
        codec: &'a C,
        comparator: &'a K,
        delimiter: &[u8],
        read_buffer_size: usize,
    ) -> Result<Self> {
        let mut readers = Vec::with_capacity(runs.len());
        for run in &runs {
            let file = File::open(run.path())?;
            readers.push(DelimitedReader::new(BufReader::new(file), delimiter, read_buffer_size)?);
        }

        let mut merger = Self {
            codec,
            comparator,
            frontier: BinaryHeap::with_capacity(runs.len()),
            readers,
            runs,
            skipped: 0,
            failed: false,
        };

        for index in 0..merger.readers.len() {
            merger.advance_run(index)?;
        }

        log::debug!(
            "Opened {} runs for merging, {} in frontier",
            merger.runs.len(),
            merger.frontier.len()
        );
        Ok(merger)
    }

    /// Reads the next decodable record of run `index` into the frontier.
    /// Leaves the run out of the frontier once it is exhausted.
    fn advance_run(&mut self, index: usize) -> Result<()> {
        while let Some(raw) = self.readers[index].read_record()? {
            if raw.is_empty() {
                continue;
            }
            match self.codec.decode(raw) {
                Some(item) => {
                    let comparator = self.comparator;
                    self.frontier.push(FrontierEntry { item, run: index, comparator });
                    return Ok(());
                }
                None => {
                    self.skipped += 1;
                    log::warn!("Skipping undecodable record in run {}", index);
                }
            }
        }
        Ok(())
    }

    /// Number of runs still holding records.
    pub fn open_runs(&self) -> usize {
        self.frontier.len()
    }

    /// Records skipped because they no longer decoded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Closes every run and deletes the run files, reporting the first
    /// deletion failure.
    pub fn finish(self) -> Result<()> {
        let RunMerger { readers, runs, .. } = self;
        drop(readers);

        let mut first_error = None;
        for run in runs {
            if let Err(e) = run.remove() {
                log::warn!("Failed to delete run file: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<C, K> Iterator for RunMerger<'_, C, K>
where
    C: RecordCodec,
    K: Comparator<C::Item>,
{
    type Item = Result<C::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        // Pop the smallest entry from the frontier
        let entry = self.frontier.pop()?;

        // Refill from the run that provided this entry
        if let Err(e) = self.advance_run(entry.run) {
            log::error!("Error advancing run {}: {}", entry.run, e);
            self.failed = true;
            return Some(Err(e));
        }

        Some(Ok(entry.item))
    }
}
