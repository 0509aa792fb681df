//! # flatjoin - External Sort and Sort-Merge Join for Flat-File Dumps
//!
//! flatjoin sorts delimited flat files far larger than memory and joins
//! several sorted files on a shared key in a single forward pass.
//!
//! ## Architecture
//!
//! The pipeline consists of several components, leaves first:
//!
//! - **Boundary Locator**: skips free-form headers and footers
//! - **Record Splitter**: cuts the payload into records chunk by chunk
//! - **Run Sorter**: sorts each chunk in memory and spills it as a run file
//! - **Run Merger**: k-way merge of all runs into one sorted file
//! - **Sorted Stream Cursor**: forward-only, peekable reader of a sorted file
//! - **Merge Join**: joins a primary stream with any number of secondaries
//!
//! The `imdb` module wires these together for the IMDb list dumps.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flatjoin::record::{ByKey, RawCodec};
//! use flatjoin::{ExternalSorter, Options, SortDefinition};
//!
//! # fn main() -> Result<(), flatjoin::Error> {
//! let def = SortDefinition::new("lines", "input.txt", "sorted.txt", "\n", RawCodec, ByKey)
//!     .start_anchor("BEGIN\n")
//!     .options(Options::new().chunk_size(64 * 1024 * 1024));
//!
//! let stats = ExternalSorter::new(def)?.run()?;
//! println!("{} records in {} runs", stats.records_written, stats.runs);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod imdb;
pub mod join;
pub mod progress;
pub mod record;
pub mod sort;

// Re-exports
pub use config::Options;
pub use error::{AnchorKind, Error, Result};
pub use join::{Attach, Composite, Lineage, MergeJoin, Secondary, SortedStreamCursor};
pub use progress::{Phase, Progress};
pub use record::{Comparator, Keyed, RecordCodec};
pub use sort::{ExternalSorter, SortDefinition, SortStats};
