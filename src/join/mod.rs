//! Streaming sort-merge join.
//!
//! One primary sorted stream is joined with any number of secondary sorted
//! streams that share its ordinal key. For each primary record with key `K`,
//! every secondary cursor first discards records with keys below `K`, then
//! collects the records equal to `K` and hands them to that secondary's
//! attach function. Cursors keep their position between primary records, so
//! the whole join is one forward pass over every stream.
//!
//! ## Preconditions
//!
//! All streams must be sorted by the same ordinal byte comparison. The
//! primary cursor asserts this for itself in debug builds, which in turn
//! guarantees that secondaries are driven with non-decreasing targets.

pub mod cursor;
pub mod lineage;

pub use cursor::SortedStreamCursor;
pub use lineage::{CarryForward, Composite, Lineage};

use crate::error::Result;
use crate::record::{Keyed, RecordCodec};
use std::io::Read;

/// A secondary stream joined into composite records of type `J`.
pub trait Attach<J> {
    /// Name used in logs and stats.
    fn name(&self) -> &str;

    /// Attaches every record whose key equals `key` to `target` and
    /// returns how many matched.
    fn attach(&mut self, target: &mut J, key: &[u8]) -> Result<usize>;

    /// Records passed over because no primary record had their key.
    fn orphans(&self) -> u64 {
        0
    }
}

/// A secondary cursor with its attach function.
pub struct Secondary<R, C: RecordCodec, F> {
    name: String,
    cursor: SortedStreamCursor<R, C>,
    attach: F,
    orphans: u64,
}

impl<R, C: RecordCodec, F> Secondary<R, C, F> {
    /// Creates a secondary stream. `attach` is called once per primary
    /// record, with an empty vector when nothing matched.
    pub fn new(name: impl Into<String>, cursor: SortedStreamCursor<R, C>, attach: F) -> Self {
        Self { name: name.into(), cursor, attach, orphans: 0 }
    }
}

impl<J, R, C, F> Attach<J> for Secondary<R, C, F>
where
    R: Read,
    C: RecordCodec,
    C::Item: Keyed,
    F: FnMut(&mut J, Vec<C::Item>),
{
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, target: &mut J, key: &[u8]) -> Result<usize> {
        let passed = self.cursor.advance_while(|k| k < key)?;
        if !passed.is_empty() {
            self.orphans += passed.len() as u64;
            log::trace!("{}: {} records without a primary match", self.name, passed.len());
        }

        let matched = self.cursor.collect_while(|k| k == key)?;
        let count = matched.len();
        (self.attach)(target, matched);
        Ok(count)
    }

    fn orphans(&self) -> u64 {
        self.orphans
    }
}

/// Counters for a join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Composite records produced.
    pub primary_records: u64,
    /// Secondary records attached.
    pub attached: u64,
    /// Records that inherited from a series root.
    pub inherited: u64,
}

/// Joins a primary sorted stream with secondary sorted streams.
///
/// `build` turns each primary record into the composite record that the
/// secondaries attach to. Produces composites lazily in primary order.
pub struct MergeJoin<R, C: RecordCodec, J, B> {
    primary: SortedStreamCursor<R, C>,
    build: B,
    secondaries: Vec<Box<dyn Attach<J>>>,
    carry: CarryForward<J>,
    stats: JoinStats,
    done: bool,
}

impl<R, C, J, B> MergeJoin<R, C, J, B>
where
    R: Read,
    C: RecordCodec,
    C::Item: Keyed,
    J: Composite,
    B: FnMut(&C::Item) -> J,
{
    /// Creates a join over `primary` with no secondaries yet.
    pub fn new(primary: SortedStreamCursor<R, C>, build: B) -> Self {
        Self {
            primary,
            build,
            secondaries: Vec::new(),
            carry: CarryForward::new(),
            stats: JoinStats::default(),
            done: false,
        }
    }

    /// Adds a secondary stream. Secondaries attach in the order added.
    pub fn with_secondary(mut self, secondary: impl Attach<J> + 'static) -> Self {
        self.secondaries.push(Box::new(secondary));
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> &JoinStats {
        &self.stats
    }

    /// Produces the next composite record.
    fn join_next(&mut self) -> Result<Option<J>> {
        let Some(item) = self.primary.advance()? else {
            return Ok(None);
        };
        let key = item.key();

        let mut record = (self.build)(&item);
        if self.carry.before_join(&mut record) {
            self.stats.inherited += 1;
        }

        for secondary in &mut self.secondaries {
            let matched = secondary.attach(&mut record, key)?;
            self.stats.attached += matched as u64;
        }

        self.carry.after_join(&record);
        self.stats.primary_records += 1;
        Ok(Some(record))
    }

    fn log_summary(&self) {
        log::info!(
            "Join finished: {} records, {} secondary records attached, {} inherited",
            self.stats.primary_records,
            self.stats.attached,
            self.stats.inherited
        );
        for secondary in &self.secondaries {
            if secondary.orphans() > 0 {
                log::info!(
                    "{}: {} records had no primary match",
                    secondary.name(),
                    secondary.orphans()
                );
            }
        }
    }
}

impl<R, C, J, B> Iterator for MergeJoin<R, C, J, B>
where
    R: Read,
    C: RecordCodec,
    C::Item: Keyed,
    J: Composite,
    B: FnMut(&C::Item) -> J,
{
    type Item = Result<J>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.join_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                self.log_summary();
                None
            }
            Err(e) => {
                log::error!("Join aborted after {} records: {}", self.stats.primary_records, e);
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
