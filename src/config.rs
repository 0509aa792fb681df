//! Configuration options for flatjoin pipelines.

use std::path::PathBuf;

/// Tuning options shared by the sort, merge and join phases.
#[derive(Debug, Clone)]
pub struct Options {
    /// Bytes read from the source per chunk. Also bounds each in-memory
    /// batch handed to the run sorter.
    /// Default: 25MB
    pub chunk_size: usize,

    /// Window size used while scanning for start/end anchors.
    /// Default: 1MB
    pub scan_window_size: usize,

    /// Initial buffer for reading one delimited record from a run or a
    /// sorted stream. Doubles until the delimiter is found.
    /// Default: 128 bytes
    pub read_buffer_size: usize,

    /// Capacity of buffered writers for run files and the sorted output.
    /// Default: 1MB
    pub write_buffer_size: usize,

    /// Directory for temporary run files.
    /// Default: None (system temp directory)
    pub temp_dir: Option<PathBuf>,

    /// Composite records handed to the sink per commit.
    /// Default: 1024
    pub sink_batch_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            chunk_size: 25 * 1024 * 1024, // 25MB
            scan_window_size: 1024 * 1024, // 1MB
            read_buffer_size: 128,
            write_buffer_size: 1024 * 1024, // 1MB
            temp_dir: None,
            sink_batch_size: 1024,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the anchor scan window size.
    pub fn scan_window_size(mut self, size: usize) -> Self {
        self.scan_window_size = size;
        self
    }

    /// Sets the initial read-until-delimiter buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the buffered writer capacity.
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the directory for temporary run files.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sets the sink batch size.
    pub fn sink_batch_size(mut self, size: usize) -> Self {
        self.sink_batch_size = size;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::Error::invalid_configuration("chunk_size must be > 0"));
        }
        if self.scan_window_size == 0 {
            return Err(crate::Error::invalid_configuration("scan_window_size must be > 0"));
        }
        if self.read_buffer_size == 0 {
            return Err(crate::Error::invalid_configuration("read_buffer_size must be > 0"));
        }
        if self.write_buffer_size == 0 {
            return Err(crate::Error::invalid_configuration("write_buffer_size must be > 0"));
        }
        if self.sink_batch_size == 0 {
            return Err(crate::Error::invalid_configuration("sink_batch_size must be > 0"));
        }
        if let Some(dir) = &self.temp_dir {
            if !dir.is_dir() {
                return Err(crate::Error::invalid_configuration(format!(
                    "temp_dir is not a directory: {:?}",
                    dir
                )));
            }
        }
        Ok(())
    }
}
