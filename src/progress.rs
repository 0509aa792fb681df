//! Progress reporting for concurrent dataset pipelines.
//!
//! Each dataset pipeline reports into one shared `Progress` value, passed by
//! reference into the threads that run them. Readers take consistent
//! snapshots for display.

use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Phase of a single dataset pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started yet.
    Pending,
    /// Locating the payload boundaries.
    Locating,
    /// Splitting chunks and writing sorted runs.
    Sorting,
    /// Merging runs into the output.
    Merging,
    /// Finished successfully.
    Done,
    /// Aborted with a fatal error.
    Failed,
}

/// Progress of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetProgress {
    /// Current phase.
    pub phase: Phase,
    /// Payload bytes split into records so far.
    pub bytes_done: u64,
    /// Payload size, known once boundaries are located.
    pub bytes_total: u64,
    /// Run files written so far.
    pub runs: usize,
}

impl Default for DatasetProgress {
    fn default() -> Self {
        Self { phase: Phase::Pending, bytes_done: 0, bytes_total: 0, runs: 0 }
    }
}

impl DatasetProgress {
    /// Percentage of the payload processed, 0-100.
    pub fn percent(&self) -> u8 {
        match self.phase {
            Phase::Done => 100,
            _ if self.bytes_total == 0 => 0,
            _ => ((self.bytes_done.min(self.bytes_total) * 100) / self.bytes_total) as u8,
        }
    }
}

/// Shared progress state for a set of dataset pipelines.
#[derive(Debug, Default)]
pub struct Progress {
    datasets: Mutex<BTreeMap<String, DatasetProgress>>,
}

impl Progress {
    /// Creates an empty progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the entry for `dataset`, creating it if needed.
    pub fn update(&self, dataset: &str, f: impl FnOnce(&mut DatasetProgress)) {
        let mut datasets = self.datasets.lock();
        f(datasets.entry(dataset.to_string()).or_default());
    }

    /// Sets the phase of `dataset`.
    pub fn set_phase(&self, dataset: &str, phase: Phase) {
        self.update(dataset, |p| p.phase = phase);
    }

    /// Returns the current state of `dataset`, if it has reported.
    pub fn get(&self, dataset: &str) -> Option<DatasetProgress> {
        self.datasets.lock().get(dataset).cloned()
    }

    /// Returns a consistent copy of every dataset's progress.
    pub fn snapshot(&self) -> Vec<(String, DatasetProgress)> {
        self.datasets.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Formats a one-line summary such as `genres: 40%, movies: 100%`.
    pub fn summary(&self) -> String {
        self.snapshot()
            .iter()
            .map(|(name, p)| format!("{}: {}%", name, p.percent()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
